use super::parsing::{
    env_optional, env_or_default, is_valid_key_prefix, parse_bool, parse_cors_origins,
    parse_environment, parse_positive_u32, parse_u16, parse_u32, parse_u64,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    ApiSettings, AssignmentSettings, BlueprintSettings, ConfigError, CorsSettings,
    DatabaseSettings, RedisSettings, RuntimeSettings, SecuritySettings, ServerHost, ServerPort,
    ServerSettings, SessionSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("LMS_HOST", "0.0.0.0");
        let port = env_or_default("LMS_PORT", "8000");

        let environment =
            parse_environment(env_optional("LMS_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("LMS_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "LMS Exam API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None => load_or_create_secret_key(),
        };
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "lms");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "lms_exam");
        let database_url = env_optional("DATABASE_URL");

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let variant_code_base = parse_u32(
            "BLUEPRINT_VARIANT_CODE_BASE",
            env_or_default("BLUEPRINT_VARIANT_CODE_BASE", "101"),
        )?;
        let max_variants = parse_positive_u32(
            "BLUEPRINT_MAX_VARIANTS",
            env_or_default("BLUEPRINT_MAX_VARIANTS", "24"),
        )?;

        let key_prefix = env_or_default("SESSION_KEY_PREFIX", "lms_attempt");
        let violation_review_threshold = parse_u32(
            "VIOLATION_REVIEW_THRESHOLD",
            env_or_default("VIOLATION_REVIEW_THRESHOLD", "3"),
        )?;
        let tick_interval_ms =
            parse_u64("SESSION_TICK_INTERVAL_MS", env_or_default("SESSION_TICK_INTERVAL_MS", "1000"))?;
        let idle_evict_seconds = parse_u64(
            "SESSION_IDLE_EVICT_SECONDS",
            env_or_default("SESSION_IDLE_EVICT_SECONDS", "120"),
        )?;

        let sweep_interval_seconds = parse_u64(
            "ASSIGNMENT_SWEEP_INTERVAL_SECONDS",
            env_or_default("ASSIGNMENT_SWEEP_INTERVAL_SECONDS", "60"),
        )?;

        let log_level = env_or_default("LMS_LOG_LEVEL", "info");
        let json = env_optional("LMS_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings { host: ServerHost::parse(host)?, port: ServerPort::parse(port)? },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            blueprint: BlueprintSettings { variant_code_base, max_variants },
            session: SessionSettings {
                key_prefix,
                violation_review_threshold,
                tick_interval_ms,
                idle_evict_seconds,
            },
            assignment: AssignmentSettings { sweep_interval_seconds },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn blueprint(&self) -> &BlueprintSettings {
        &self.blueprint
    }

    pub(crate) fn session(&self) -> &SessionSettings {
        &self.session
    }

    pub(crate) fn assignment(&self) -> &AssignmentSettings {
        &self.assignment
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_key_prefix(&self.session.key_prefix) {
            return Err(ConfigError::InvalidValue {
                field: "SESSION_KEY_PREFIX",
                value: self.session.key_prefix.clone(),
            });
        }

        if self.session.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SESSION_TICK_INTERVAL_MS",
                value: String::from("0"),
            });
        }

        if self.assignment.sweep_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ASSIGNMENT_SWEEP_INTERVAL_SECONDS",
                value: String::from("0"),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}
