#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = lms_exam::run_worker().await {
        eprintln!("lms-exam worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
