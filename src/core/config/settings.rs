use super::parsing::{
    env_flag, env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment,
    parse_positive_u64, parse_u16, parse_u32, parse_u64,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    AdminSettings, AiSettings, ApiSettings, ConfigError, CorsSettings, DatabaseSettings,
    ExamSettings, RedisSettings, RuntimeSettings, SandboxSettings, SecuritySettings, ServerHost,
    ServerPort, ServerSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("CODEGRADE_HOST", "0.0.0.0");
        let port = env_or_default("CODEGRADE_PORT", "8000");

        let environment = parse_environment(
            env_optional("CODEGRADE_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("CODEGRADE_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "CodeGrade API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None if strict_config => return Err(ConfigError::MissingSecret("SECRET_KEY")),
            None => load_or_create_secret_key(env_optional("SECRET_KEY_FILE")),
        };
        let access_token_expire_minutes = parse_positive_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "1440"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "codegrade");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "codegrade");
        let database_url = env_optional("DATABASE_URL");
        let max_connections =
            parse_u32("DATABASE_MAX_CONNECTIONS", env_or_default("DATABASE_MAX_CONNECTIONS", "20"))?;

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let ai = AiSettings {
            api_key: env_or_default("OPENAI_API_KEY", ""),
            base_url: env_or_default("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            model: env_or_default("AI_MODEL", "gpt-4o-mini"),
            max_tokens: parse_u32("AI_MAX_TOKENS", env_or_default("AI_MAX_TOKENS", "2000"))?,
            request_timeout_seconds: parse_positive_u64(
                "AI_REQUEST_TIMEOUT",
                env_or_default("AI_REQUEST_TIMEOUT", "120"),
            )?,
        };

        let sandbox = SandboxSettings {
            base_url: env_or_default("SANDBOX_BASE_URL", ""),
            api_key: env_or_default("SANDBOX_API_KEY", ""),
            timeout_seconds: parse_positive_u64(
                "SANDBOX_TIMEOUT_SECONDS",
                env_or_default("SANDBOX_TIMEOUT_SECONDS", "30"),
            )?,
            poll_interval_ms: parse_positive_u64(
                "SANDBOX_POLL_INTERVAL_MS",
                env_or_default("SANDBOX_POLL_INTERVAL_MS", "500"),
            )?,
            max_poll_attempts: parse_u32(
                "SANDBOX_MAX_POLL_ATTEMPTS",
                env_or_default("SANDBOX_MAX_POLL_ATTEMPTS", "40"),
            )?,
            run_rate_limit: parse_positive_u64(
                "CODE_RUN_RATE_LIMIT",
                env_or_default("CODE_RUN_RATE_LIMIT", "20"),
            )?,
            run_rate_window_seconds: parse_positive_u64(
                "CODE_RUN_RATE_WINDOW_SECONDS",
                env_or_default("CODE_RUN_RATE_WINDOW_SECONDS", "60"),
            )?,
        };

        let max_grading_attempts = parse_u32(
            "MAX_GRADING_ATTEMPTS",
            env_or_default("MAX_GRADING_ATTEMPTS", "3"),
        )? as i32;
        let close_interval_seconds = parse_positive_u64(
            "EXAM_CLOSE_INTERVAL_SECONDS",
            env_or_default("EXAM_CLOSE_INTERVAL_SECONDS", "60"),
        )?;
        let grading_poll_seconds = parse_positive_u64(
            "GRADING_POLL_SECONDS",
            env_or_default("GRADING_POLL_SECONDS", "5"),
        )?;
        let grading_workers =
            parse_u64("GRADING_WORKERS", env_or_default("GRADING_WORKERS", "2"))? as usize;

        let first_superuser_username = env_or_default("FIRST_SUPERUSER_USERNAME", "admin");
        let first_superuser_password = env_or_default("FIRST_SUPERUSER_PASSWORD", "");

        let log_level = env_or_default("CODEGRADE_LOG_LEVEL", "info");
        let json = env_flag("CODEGRADE_LOG_JSON", false);
        let prometheus_enabled = env_flag("PROMETHEUS_ENABLED", false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, access_token_expire_minutes, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            ai,
            sandbox,
            exam: ExamSettings {
                max_grading_attempts,
                close_interval_seconds,
                grading_poll_seconds,
                grading_workers,
            },
            admin: AdminSettings { first_superuser_username, first_superuser_password },
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

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn sandbox(&self) -> &SandboxSettings {
        &self.sandbox
    }

    pub(crate) fn exam(&self) -> &ExamSettings {
        &self.exam
    }

    pub(crate) fn admin(&self) -> &AdminSettings {
        &self.admin
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.security.algorithm != "HS256" {
            return Err(ConfigError::InvalidValue {
                field: "ALGORITHM",
                value: self.security.algorithm.clone(),
            });
        }

        if self.exam.grading_workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "GRADING_WORKERS",
                value: "0".to_string(),
            });
        }

        if self.sandbox.max_poll_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SANDBOX_MAX_POLL_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        if !self.runtime.strict_config {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if !self.ai.is_configured() {
            return Err(ConfigError::MissingSecret("OPENAI_API_KEY/OPENAI_BASE_URL"));
        }
        if !self.sandbox.is_configured() {
            return Err(ConfigError::MissingSecret("SANDBOX_BASE_URL"));
        }
        if self.admin.first_superuser_password.is_empty() {
            return Err(ConfigError::MissingSecret("FIRST_SUPERUSER_PASSWORD"));
        }

        Ok(())
    }
}
