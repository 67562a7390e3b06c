//! Configuration, credentials and endpoint selection.
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// SUNAT environment selection for the billService endpoints.
/// - Beta: the test environment ("e-beta"), open to the MODDATOS test user.
/// - Production: the live environment ("e-factura").
///
/// # Examples
/// ```rust
/// use std::str::FromStr;
/// use factura_core::config::Environment;
///
/// let env = Environment::from_str("beta")?;
/// assert_eq!(env, Environment::Beta);
/// # Ok::<(), factura_core::config::EnvironmentParseError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Beta,
    Production,
}

/// Error returned when parsing an [`Environment`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentParseError {
    #[error("invalid environment: {input}")]
    Invalid { input: String },
}

impl FromStr for Environment {
    type Err = EnvironmentParseError;
    fn from_str(env: &str) -> Result<Environment, EnvironmentParseError> {
        match env.to_ascii_lowercase().as_str() {
            "beta" => Ok(Environment::Beta),
            "production" => Ok(Environment::Production),
            _ => Err(EnvironmentParseError::Invalid {
                input: env.to_string(),
            }),
        }
    }
}

/// Service operation families, each with its own endpoint per environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceOperation {
    /// sendBill and friends on billService.
    Submit,
    /// getStatus by document identifier on billConsultService.
    ConsultStatus,
    /// getStatus by ticket on billConsultService.
    ConsultTicket,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Beta => "beta",
            Environment::Production => "production",
        }
    }

    /// Static routing table: (operation, environment) -> URL. No retries,
    /// no health checks.
    pub fn endpoint_url(&self, operation: ServiceOperation) -> &'static str {
        match (operation, self) {
            (ServiceOperation::Submit, Environment::Beta) => {
                "https://e-beta.sunat.gob.pe/ol-ti-itcpfegem-beta/billService"
            }
            (ServiceOperation::Submit, Environment::Production) => {
                "https://e-factura.sunat.gob.pe/ol-ti-itcpfegem/billService"
            }
            (
                ServiceOperation::ConsultStatus | ServiceOperation::ConsultTicket,
                Environment::Beta,
            ) => "https://e-beta.sunat.gob.pe/ol-it-wsconscpegem-beta/billConsultService",
            (
                ServiceOperation::ConsultStatus | ServiceOperation::ConsultTicket,
                Environment::Production,
            ) => "https://e-factura.sunat.gob.pe/ol-it-wsconscpegem/billConsultService",
        }
    }
}

/// SOL credentials used by the WS-Security header. SUNAT expects the
/// username to be the issuer RUC concatenated with the SOL user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolCredentials {
    ruc: String,
    username: String,
    password: String,
}

impl SolCredentials {
    pub fn new(
        ruc: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            ruc: ruc.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn ruc(&self) -> &str {
        &self.ruc
    }

    /// The wire username: `{RUC}{SOL user}`.
    pub fn sol_username(&self) -> String {
        format!("{}{}", self.ruc, self.username)
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

/// Configuration for the SUNAT client.
///
/// # Examples
/// ```rust
/// use factura_core::config::{Config, Environment, SolCredentials};
///
/// let config = Config::new(
///     Environment::Beta,
///     SolCredentials::new("20123456789", "MODDATOS", "moddatos"),
/// );
/// # let _ = config;
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    env: Environment,
    credentials: SolCredentials,
    timeout: Option<Duration>,
}

impl Config {
    pub fn new(env: Environment, credentials: SolCredentials) -> Self {
        Self {
            env,
            credentials,
            timeout: Some(Duration::from_secs(60)),
        }
    }

    /// SUNAT gives no latency guarantee; `None` disables the bound.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn env(&self) -> Environment {
        self.env
    }

    pub fn credentials(&self) -> &SolCredentials {
        &self.credentials
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_known_values() {
        assert_eq!(Environment::from_str("beta"), Ok(Environment::Beta));
        assert_eq!(
            Environment::from_str("Production"),
            Ok(Environment::Production)
        );
        assert!(matches!(
            Environment::from_str("staging"),
            Err(EnvironmentParseError::Invalid { .. })
        ));
    }

    #[test]
    fn endpoint_table_is_fixed_per_operation() {
        for operation in [
            ServiceOperation::Submit,
            ServiceOperation::ConsultStatus,
            ServiceOperation::ConsultTicket,
        ] {
            let beta = Environment::Beta.endpoint_url(operation);
            let production = Environment::Production.endpoint_url(operation);
            assert!(beta.starts_with("https://e-beta.sunat.gob.pe/"));
            assert!(production.starts_with("https://e-factura.sunat.gob.pe/"));
            // Calling twice yields the same URL: a pure mapping.
            assert_eq!(beta, Environment::Beta.endpoint_url(operation));
            assert_eq!(production, Environment::Production.endpoint_url(operation));
        }
        assert_eq!(
            Environment::Beta.endpoint_url(ServiceOperation::Submit),
            "https://e-beta.sunat.gob.pe/ol-ti-itcpfegem-beta/billService"
        );
        assert_eq!(
            Environment::Production.endpoint_url(ServiceOperation::ConsultTicket),
            "https://e-factura.sunat.gob.pe/ol-it-wsconscpegem/billConsultService"
        );
    }

    #[test]
    fn sol_username_prefixes_ruc() {
        let creds = SolCredentials::new("20123456789", "MODDATOS", "moddatos");
        assert_eq!(creds.sol_username(), "20123456789MODDATOS");
    }
}
