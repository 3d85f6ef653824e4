pub(crate) mod assignments;
pub(crate) mod exams;
pub(crate) mod health;
pub(crate) mod postgres;
pub(crate) mod questions;
pub(crate) mod submissions;
pub(crate) mod traits;

pub(crate) use postgres::PgCatalog;
pub(crate) use traits::{
    Catalog, CatalogError, ExamCatalog, QuestionPool, QuestionUsage, SubmissionLedger,
};
