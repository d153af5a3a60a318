//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] wrappers used for connection strings such as
//! `REDIS_URL`, which can embed a password (`redis://:password@host:6379`).
//!
//! `SecretString` implements `Debug` with redaction, so a config struct that
//! derives or hand-writes `Debug` cannot leak the value through `{:?}` or a
//! tracing field. The value is zeroized on drop.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! let url = SecretString::from("redis://:hunter2@cache:6379");
//! assert!(!format!("{url:?}").contains("hunter2"));
//! assert_eq!(url.expose_secret(), "redis://:hunter2@cache:6379");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
