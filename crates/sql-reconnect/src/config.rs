use crate::events::ConnectionEvent;
use crate::policy::ReconnectPolicy;
use crate::statement::StatementKind;
use crate::value::{DriverOptions, Value};
use sql_reconnect_core::events::{EventListener, EventListeners, FnListener};
use sql_reconnect_core::{DriverError, FnClassifier, GoneAwayClassifier, TransientClassifier};
use std::fmt;
use std::sync::Arc;

/// Default number of reconnections allowed for a single call.
pub const DEFAULT_MAX_RECONNECTION: u32 = 5;

/// DSN and credentials used to (re)dial the database.
#[derive(Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionParameters {
    pub dsn: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectionParameters {
    /// Creates fully populated parameters.
    pub fn new(
        dsn: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            dsn: Some(dsn.into()),
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Names of the parameters that are not set. Empty strings count as set.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.dsn.is_none() {
            missing.push("dsn");
        }
        if self.username.is_none() {
            missing.push("username");
        }
        if self.password.is_none() {
            missing.push("password");
        }
        missing
    }

    /// Returns true when DSN, username and password are all set.
    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("dsn", &self.dsn)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Configuration for a reconnecting connection.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub(crate) parameters: ConnectionParameters,
    pub(crate) options: DriverOptions,
    pub(crate) max_reconnection: u32,
    pub(crate) name: String,
    pub(crate) policy: ReconnectPolicy,
    pub(crate) liveness_probe: bool,
    pub(crate) classifier: Arc<dyn TransientClassifier>,
    pub(crate) event_listeners: EventListeners<ConnectionEvent>,
}

impl ConnectionConfig {
    /// Creates a new builder for configuring a connection.
    pub fn builder() -> ConnectionConfigBuilder {
        crate::describe_metrics();
        ConnectionConfigBuilder::default()
    }

    pub fn parameters(&self) -> &ConnectionParameters {
        &self.parameters
    }

    pub fn dsn(&self) -> Option<&str> {
        self.parameters.dsn.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.parameters.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.parameters.password.as_deref()
    }

    /// Driver options passed on every dial.
    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Maximum reconnections for one call before giving up.
    pub fn max_reconnection(&self) -> u32 {
        self.max_reconnection
    }

    /// Label used in events, tracing fields and metrics.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Whether a liveness probe precedes dispatched calls.
    pub fn liveness_probe(&self) -> bool {
        self.liveness_probe
    }

    /// Checks whether the error should trigger reconnection.
    pub fn is_transient(&self, error: &DriverError) -> bool {
        self.classifier.is_transient(error)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfigBuilder::default().build()
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("parameters", &self.parameters)
            .field("options", &self.options)
            .field("max_reconnection", &self.max_reconnection)
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("liveness_probe", &self.liveness_probe)
            .field("listeners", &self.event_listeners.len())
            .finish()
    }
}

/// Builder for constructing a [`ConnectionConfig`].
pub struct ConnectionConfigBuilder {
    parameters: ConnectionParameters,
    options: DriverOptions,
    max_reconnection: u32,
    name: String,
    policy: ReconnectPolicy,
    liveness_probe: bool,
    classifier: Arc<dyn TransientClassifier>,
    event_listeners: EventListeners<ConnectionEvent>,
}

impl ConnectionConfigBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the data source name.
    ///
    /// # Examples
    ///
    /// ```
    /// use sql_reconnect::ConnectionConfig;
    ///
    /// let config = ConnectionConfig::builder()
    ///     .dsn("mysql:host=db.internal;dbname=shop")
    ///     .username("app")
    ///     .password("secret")
    ///     .build();
    ///
    /// assert!(config.parameters().is_complete());
    /// ```
    pub fn dsn(mut self, dsn: impl Into<String>) -> Self {
        self.parameters.dsn = Some(dsn.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.parameters.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.parameters.password = Some(password.into());
        self
    }

    /// Replaces DSN and credentials at once.
    pub fn parameters(mut self, parameters: ConnectionParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Adds one driver option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Replaces all driver options.
    pub fn options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the maximum number of reconnections per call.
    ///
    /// Default is 5. Zero disables reconnection: the first transient error
    /// fails the call with `ExceededMaxReconnection`.
    pub fn max_reconnection(mut self, max: u32) -> Self {
        self.max_reconnection = max;
        self
    }

    /// Sets the name used in events, logs and metric labels.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the delay policy applied before each reconnection.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use sql_reconnect::{ConnectionConfig, ReconnectPolicy};
    ///
    /// let config = ConnectionConfig::builder()
    ///     .policy(ReconnectPolicy::exponential(
    ///         Duration::from_millis(50),
    ///         Duration::from_secs(2),
    ///     ))
    ///     .build();
    /// ```
    pub fn policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enables or disables the liveness probe. Default is enabled.
    pub fn liveness_probe(mut self, enabled: bool) -> Self {
        self.liveness_probe = enabled;
        self
    }

    /// Sets the classifier deciding which driver errors are transient.
    pub fn classifier<C>(mut self, classifier: C) -> Self
    where
        C: TransientClassifier + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Treats errors matching the predicate as transient.
    ///
    /// # Examples
    ///
    /// ```
    /// use sql_reconnect::ConnectionConfig;
    ///
    /// let config = ConnectionConfig::builder()
    ///     .transient_when(|err| err.code() == Some(2006) || err.code() == Some(2013))
    ///     .build();
    /// ```
    pub fn transient_when<F>(self, predicate: F) -> Self
    where
        F: Fn(&DriverError) -> bool + Send + Sync + 'static,
    {
        self.classifier(FnClassifier::new(predicate))
    }

    /// Registers a listener for every connection event.
    pub fn on_event<L>(mut self, listener: L) -> Self
    where
        L: EventListener<ConnectionEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Called with the attempt number after each successful reconnection.
    ///
    /// # Examples
    ///
    /// ```
    /// use sql_reconnect::ConnectionConfig;
    ///
    /// let config = ConnectionConfig::builder()
    ///     .on_reconnect(|attempt| {
    ///         println!("reconnected on attempt {}", attempt);
    ///     })
    ///     .build();
    /// ```
    pub fn on_reconnect<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.event_listeners.add_for(
            &["reconnected"],
            FnListener::new(move |event: &ConnectionEvent| {
                if let ConnectionEvent::Reconnected { attempt, .. } = event {
                    f(*attempt);
                }
            }),
        );
        self
    }

    /// Called with the attempt count when a call gives up.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.event_listeners.add_for(
            &["reconnect_exhausted"],
            FnListener::new(move |event: &ConnectionEvent| {
                if let ConnectionEvent::ReconnectExhausted { attempts, .. } = event {
                    f(*attempts);
                }
            }),
        );
        self
    }

    /// Called after a statement is rebuilt, with the rows replayed.
    pub fn on_statement_recreated<F>(mut self, f: F) -> Self
    where
        F: Fn(StatementKind, u64) + Send + Sync + 'static,
    {
        self.event_listeners.add_for(
            &["statement_recreated"],
            FnListener::new(move |event: &ConnectionEvent| {
                if let ConnectionEvent::StatementRecreated {
                    kind,
                    replayed_rows,
                    ..
                } = event
                {
                    f(*kind, *replayed_rows);
                }
            }),
        );
        self
    }

    /// Builds the [`ConnectionConfig`].
    pub fn build(mut self) -> ConnectionConfig {
        self.event_listeners.set_connection(self.name.as_str());
        ConnectionConfig {
            parameters: self.parameters,
            options: self.options,
            max_reconnection: self.max_reconnection,
            name: self.name,
            policy: self.policy,
            liveness_probe: self.liveness_probe,
            classifier: self.classifier,
            event_listeners: self.event_listeners,
        }
    }
}

impl Default for ConnectionConfigBuilder {
    fn default() -> Self {
        Self {
            parameters: ConnectionParameters::default(),
            options: DriverOptions::new(),
            max_reconnection: DEFAULT_MAX_RECONNECTION,
            name: String::from("<unnamed>"),
            policy: ReconnectPolicy::default(),
            liveness_probe: true,
            classifier: Arc::new(GoneAwayClassifier::default()),
            event_listeners: EventListeners::new(),
        }
    }
}

impl fmt::Debug for ConnectionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfigBuilder")
            .field("parameters", &self.parameters)
            .field("max_reconnection", &self.max_reconnection)
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
