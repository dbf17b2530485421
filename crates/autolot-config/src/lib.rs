mod error;
mod project;
mod validation;
mod vars;

pub use error::{ConfigError, ConfigResult};
pub use project::{
    FieldsConfig, IngestSection, PostgresConfig, ProjectConfig, QuerySection, ServerSection,
    SourceConfig, DEFAULT_CONFIG_PATH,
};
pub use validation::validate_project;
pub use vars::resolve_env;
