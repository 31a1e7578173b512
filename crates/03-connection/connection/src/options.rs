use serde::Deserialize;

/// Settings applied when a connection is created.
///
/// Deserializable so a host can keep them in a config file; missing fields
/// take their defaults.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionOptions {
    /// Resume delivery as soon as a named-service connection is created.
    /// Ignored when wrapping an existing handle; `bootstrap` always resumes.
    pub activate: bool,
    /// Label for the connection's serial queue. Derived from the service
    /// name when unset.
    pub queue_label: Option<String>,
    /// Emit a warning for faults outside the known error kinds instead of
    /// dropping them silently.
    pub log_unclassified_faults: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            activate: true,
            queue_label: None,
            log_unclassified_faults: false,
        }
    }
}

impl ConnectionOptions {
    /// Options that leave a new connection suspended.
    pub fn inactive() -> Self {
        Self::default().activate(false)
    }

    pub fn activate(mut self, activate: bool) -> Self {
        self.activate = activate;
        self
    }

    pub fn queue_label(mut self, label: impl Into<String>) -> Self {
        self.queue_label = Some(label.into());
        self
    }

    pub fn log_unclassified_faults(mut self, enabled: bool) -> Self {
        self.log_unclassified_faults = enabled;
        self
    }

    pub(crate) fn label_for(&self, service: Option<&str>) -> String {
        match (&self.queue_label, service) {
            (Some(label), _) => label.clone(),
            (None, Some(name)) if !name.is_empty() => format!("xpc.connection.{name}"),
            (None, _) => "xpc.connection.peer".to_owned(),
        }
    }
}
