//! Parameter<T> - typed instrument quantities bound to a session
//!
//! A parameter is a named, dual-mode callable: [`Parameter::call`] with `None`
//! reads the quantity from the instrument, with `Some(value)` writes it. Each
//! parameter composes
//! - a get and/or set [`CommandTemplate`],
//! - a decoder (response text to `T`) and an encoder (`T` to command text),
//! - an optional [`Validator`],
//! - the shared [`Session`] it talks through.
//!
//! Templates are checked once, when the parameter is built: a get template has
//! no value slot, a set template has exactly one, and neither may carry
//! unbound placeholders.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use daq_param::parameter::Parameter;
//! use daq_param::session::{Backend, Session, SessionConfig};
//! use daq_param::validation::NumberRange;
//!
//! let session = Arc::new(
//!     Session::open("ASRL1::INSTR", Backend::Simulated(None), SessionConfig::default()).unwrap(),
//! );
//! let reference = Parameter::<f64>::builder("reference_level", session)
//!     .get_cmd("REF?")
//!     .set_cmd("REF {value}")
//!     .validator(NumberRange::between(-30.0, 30.0).unwrap())
//!     .unit("dBm")
//!     .build()
//!     .unwrap();
//!
//! reference.set(-12.5).unwrap();
//! assert_eq!(reference.get().unwrap(), -12.5);
//! assert!(reference.set(99.0).is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ParamError, ParamResult};
use crate::session::{Session, Transaction};
use crate::template::CommandTemplate;
use crate::validation::Validator;
use crate::value::{ParamValue, Value};

/// Response text to typed value.
pub type Decoder<T> = Arc<dyn Fn(&str) -> Result<T, String> + Send + Sync>;

/// Typed value to the text substituted into a set template.
pub type Encoder<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// What a get does when the instrument reports a value the validator rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadPolicy {
    /// Log a warning and return the value anyway.
    #[default]
    Observe,
    /// Fail the get with a validation error.
    Enforce,
}

// =============================================================================
// Snapshot / dynamic access
// =============================================================================

/// Serializable description of a parameter and its last known value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSnapshot {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub get_cmd: Option<String>,
    pub set_cmd: Option<String>,
    pub settable: bool,
    pub validator: Option<String>,
    pub value: Option<Value>,
}

/// Object-safe view of a parameter, for heterogeneous collections.
pub trait ParameterBase: Send + Sync {
    /// Parameter name
    fn name(&self) -> &str;

    /// Description and cached value
    fn snapshot(&self) -> ParameterSnapshot;

    /// Read from the instrument, returning the encoded text of the value.
    fn get_text(&self) -> ParamResult<String>;

    /// Decode `text` with the parameter's decoder and set the result.
    fn set_text(&self, text: &str) -> ParamResult<()>;
}

// =============================================================================
// Parameter
// =============================================================================

pub struct Parameter<T: ParamValue> {
    name: String,
    description: Option<String>,
    unit: Option<String>,
    session: Arc<Session>,
    get_cmd: Option<CommandTemplate>,
    set_cmd: Option<CommandTemplate>,
    decoder: Decoder<T>,
    encoder: Encoder<T>,
    validator: Option<Arc<dyn Validator>>,
    settable: bool,
    pre_cmd: Option<String>,
    post_cmd: Option<String>,
    read_after_setting: bool,
    query_delay: Duration,
    read_policy: ReadPolicy,

    /// Last value read or written
    cache: Mutex<Option<T>>,
}

impl<T: ParamValue> Parameter<T> {
    /// Start building a parameter named `name` that talks through `session`.
    pub fn builder(name: impl Into<String>, session: Arc<Session>) -> ParameterBuilder<T> {
        ParameterBuilder::new(name, session)
    }

    /// Get when `value` is `None`, set otherwise. A set returns `None`.
    pub fn call(&self, value: Option<T>) -> ParamResult<Option<T>> {
        match value {
            None => self.get().map(Some),
            Some(value) => self.set(value).map(|()| None),
        }
    }

    /// Query the instrument and decode the response.
    pub fn get(&self) -> ParamResult<T> {
        let template = self.get_cmd.as_ref().ok_or_else(|| {
            ParamError::Usage(format!("parameter '{}' has no get command", self.name))
        })?;
        let command = template.render_plain()?;

        let response = {
            let mut tx = self.session.transaction()?;
            if let Some(pre) = &self.pre_cmd {
                self.send(&mut tx, pre)?;
            }
            let response = tx.query_with_delay(&command, self.query_delay)?;
            if let Some(post) = &self.post_cmd {
                self.send(&mut tx, post)?;
            }
            response
        };

        let value = (self.decoder)(&response).map_err(|reason| ParamError::Decode {
            parameter: self.name.clone(),
            response: response.clone(),
            reason,
        })?;

        if let Some(validator) = &self.validator {
            if let Err(violation) = validator.validate(&value.to_value()) {
                match self.read_policy {
                    ReadPolicy::Observe => warn!(
                        parameter = %self.name,
                        %response,
                        violation = %violation,
                        "instrument reported a value outside the validator"
                    ),
                    ReadPolicy::Enforce => {
                        return Err(ParamError::validation(&self.name, violation))
                    }
                }
            }
        }

        debug!(parameter = %self.name, value = ?value, "get");
        self.store(value.clone());
        Ok(value)
    }

    /// Validate, encode and write `value`. Nothing is sent when validation fails.
    pub fn set(&self, value: T) -> ParamResult<()> {
        if !self.settable {
            return Err(ParamError::Usage(format!(
                "parameter '{}' is read-only",
                self.name
            )));
        }
        let template = self.set_cmd.as_ref().ok_or_else(|| {
            ParamError::Usage(format!("parameter '{}' has no set command", self.name))
        })?;

        if let Some(validator) = &self.validator {
            validator
                .validate(&value.to_value())
                .map_err(|e| ParamError::validation(&self.name, e))?;
        }
        let command = template.render(&(self.encoder)(&value))?;

        {
            let mut tx = self.session.transaction()?;
            if let Some(pre) = &self.pre_cmd {
                self.send(&mut tx, pre)?;
            }
            self.send(&mut tx, &command)?;
            if let Some(post) = &self.post_cmd {
                self.send(&mut tx, post)?;
            }
        }

        debug!(parameter = %self.name, value = ?value, "set");
        self.store(value);
        Ok(())
    }

    fn send(&self, tx: &mut Transaction<'_>, command: &str) -> ParamResult<()> {
        if self.read_after_setting {
            let ack = tx.query(command)?;
            debug!(parameter = %self.name, %ack, "discarded acknowledgement");
            Ok(())
        } else {
            tx.write(command)
        }
    }

    fn store(&self, value: T) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    /// Last value read or written, without talking to the instrument.
    pub fn cached(&self) -> Option<T> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn is_settable(&self) -> bool {
        self.settable && self.set_cmd.is_some()
    }

    pub fn is_gettable(&self) -> bool {
        self.get_cmd.is_some()
    }

    pub fn get_cmd(&self) -> Option<&CommandTemplate> {
        self.get_cmd.as_ref()
    }

    pub fn set_cmd(&self) -> Option<&CommandTemplate> {
        self.set_cmd.as_ref()
    }

    pub fn validator(&self) -> Option<&Arc<dyn Validator>> {
        self.validator.as_ref()
    }

    pub fn read_policy(&self) -> ReadPolicy {
        self.read_policy
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            name: self.name.clone(),
            unit: self.unit.clone(),
            description: self.description.clone(),
            get_cmd: self.get_cmd.as_ref().map(ToString::to_string),
            set_cmd: self.set_cmd.as_ref().map(ToString::to_string),
            settable: self.is_settable(),
            validator: self.validator.as_ref().map(ToString::to_string),
            value: self.cached().map(|v| v.to_value()),
        }
    }
}

impl Parameter<Identification> {
    /// Get-only `*IDN?` parameter.
    pub fn identification(session: Arc<Session>) -> ParamResult<Self> {
        Self::builder("IDN", session)
            .get_cmd("*IDN?")
            .read_only()
            .description("Instrument identification")
            .build()
    }
}

impl<T: ParamValue> fmt::Debug for Parameter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("resource", &self.session.resource())
            .field("get_cmd", &self.get_cmd.as_ref().map(ToString::to_string))
            .field("set_cmd", &self.set_cmd.as_ref().map(ToString::to_string))
            .field("settable", &self.settable)
            .finish_non_exhaustive()
    }
}

impl<T: ParamValue> ParameterBase for Parameter<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot(&self) -> ParameterSnapshot {
        Parameter::snapshot(self)
    }

    fn get_text(&self) -> ParamResult<String> {
        let value = self.get()?;
        Ok((self.encoder)(&value))
    }

    fn set_text(&self, text: &str) -> ParamResult<()> {
        let value = (self.decoder)(text).map_err(|reason| ParamError::Decode {
            parameter: self.name.clone(),
            response: text.to_string(),
            reason,
        })?;
        self.set(value)
    }
}

// =============================================================================
// Parameter Builder (Fluent API)
// =============================================================================

/// Builder for [`Parameter`]. Templates are kept as text until [`build`](Self::build).
pub struct ParameterBuilder<T: ParamValue> {
    name: String,
    session: Arc<Session>,
    description: Option<String>,
    unit: Option<String>,
    get_cmd: Option<String>,
    set_cmd: Option<String>,
    decoder: Decoder<T>,
    encoder: Encoder<T>,
    validator: Option<Arc<dyn Validator>>,
    settable: bool,
    pre_cmd: Option<String>,
    post_cmd: Option<String>,
    read_after_setting: bool,
    query_delay: Duration,
    read_policy: ReadPolicy,
}

impl<T: ParamValue> Clone for ParameterBuilder<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            session: Arc::clone(&self.session),
            description: self.description.clone(),
            unit: self.unit.clone(),
            get_cmd: self.get_cmd.clone(),
            set_cmd: self.set_cmd.clone(),
            decoder: Arc::clone(&self.decoder),
            encoder: Arc::clone(&self.encoder),
            validator: self.validator.clone(),
            settable: self.settable,
            pre_cmd: self.pre_cmd.clone(),
            post_cmd: self.post_cmd.clone(),
            read_after_setting: self.read_after_setting,
            query_delay: self.query_delay,
            read_policy: self.read_policy,
        }
    }
}

impl<T: ParamValue> ParameterBuilder<T> {
    pub fn new(name: impl Into<String>, session: Arc<Session>) -> Self {
        Self {
            name: name.into(),
            session,
            description: None,
            unit: None,
            get_cmd: None,
            set_cmd: None,
            decoder: Arc::new(T::decode_text),
            encoder: Arc::new(T::encode_text),
            validator: None,
            settable: true,
            pre_cmd: None,
            post_cmd: None,
            read_after_setting: false,
            query_delay: Duration::ZERO,
            read_policy: ReadPolicy::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_cmd(mut self, pattern: impl Into<String>) -> Self {
        self.get_cmd = Some(pattern.into());
        self
    }

    pub fn set_cmd(mut self, pattern: impl Into<String>) -> Self {
        self.set_cmd = Some(pattern.into());
        self
    }

    /// Replace the default decoder of `T`.
    pub fn decoder(mut self, decoder: impl Fn(&str) -> Result<T, String> + Send + Sync + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    /// Replace the default encoder of `T`.
    pub fn encoder(mut self, encoder: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        self.encoder = Arc::new(encoder);
        self
    }

    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn shared_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Refuse sets even when a set command is configured.
    pub fn read_only(mut self) -> Self {
        self.settable = false;
        self
    }

    pub fn settable(mut self, settable: bool) -> Self {
        self.settable = settable;
        self
    }

    /// Command written before every get/set exchange.
    pub fn pre_cmd(mut self, command: impl Into<String>) -> Self {
        self.pre_cmd = Some(command.into());
        self
    }

    /// Command written after every get/set exchange.
    pub fn post_cmd(mut self, command: impl Into<String>) -> Self {
        self.post_cmd = Some(command.into());
        self
    }

    /// Read and discard one response line after every write.
    pub fn read_after_setting(mut self, enabled: bool) -> Self {
        self.read_after_setting = enabled;
        self
    }

    /// Delay between a get command and reading its response.
    pub fn query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    pub fn read_policy(mut self, policy: ReadPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Substitute `{slot}` in the name and in both command templates.
    pub fn bind(&self, slot: &str, value: impl fmt::Display) -> ParamResult<Self> {
        let value = value.to_string();
        let bind_text = |text: &str| -> ParamResult<String> {
            Ok(CommandTemplate::parse(text)?.bind(slot, &value)?.to_string())
        };
        let mut bound = self.clone();
        bound.name = CommandTemplate::parse(&self.name)?
            .bind(slot, &value)?
            .render_plain()?;
        bound.get_cmd = self.get_cmd.as_deref().map(bind_text).transpose()?;
        bound.set_cmd = self.set_cmd.as_deref().map(bind_text).transpose()?;
        Ok(bound)
    }

    /// Check the templates and create the parameter.
    pub fn build(self) -> ParamResult<Parameter<T>> {
        if self.name.trim().is_empty() {
            return Err(ParamError::Usage("parameter name must not be empty".into()));
        }
        let get_cmd = self
            .get_cmd
            .as_deref()
            .map(|p| checked_template(&self.name, "get", p, 0))
            .transpose()?;
        let set_cmd = self
            .set_cmd
            .as_deref()
            .map(|p| checked_template(&self.name, "set", p, 1))
            .transpose()?;

        Ok(Parameter {
            name: self.name,
            description: self.description,
            unit: self.unit,
            session: self.session,
            get_cmd,
            set_cmd,
            decoder: self.decoder,
            encoder: self.encoder,
            validator: self.validator,
            settable: self.settable,
            pre_cmd: self.pre_cmd,
            post_cmd: self.post_cmd,
            read_after_setting: self.read_after_setting,
            query_delay: self.query_delay,
            read_policy: self.read_policy,
            cache: Mutex::new(None),
        })
    }
}

fn checked_template(
    parameter: &str,
    role: &str,
    pattern: &str,
    value_slots: usize,
) -> ParamResult<CommandTemplate> {
    let template = CommandTemplate::parse(pattern)?;
    let unbound = template.unbound();
    if !unbound.is_empty() {
        return Err(ParamError::Template(format!(
            "{role} command '{pattern}' of '{parameter}' has unbound placeholders: {}",
            unbound.join(", ")
        )));
    }
    if template.value_slots() != value_slots {
        return Err(ParamError::Template(format!(
            "{role} command '{pattern}' of '{parameter}' needs {value_slots} value slot(s), found {}",
            template.value_slots()
        )));
    }
    Ok(template)
}

// =============================================================================
// Command
// =============================================================================

/// A named fire-and-forget instrument command, such as `*RST`.
#[derive(Debug)]
pub struct Command {
    name: String,
    session: Arc<Session>,
    command: String,
    read_after: bool,
}

impl Command {
    /// `pattern` may not contain placeholders.
    pub fn new(name: impl Into<String>, session: Arc<Session>, pattern: &str) -> ParamResult<Self> {
        let name = name.into();
        let template = CommandTemplate::parse(pattern)?;
        if template.value_slots() > 0 || !template.unbound().is_empty() {
            return Err(ParamError::Template(format!(
                "command '{pattern}' of '{name}' must not contain placeholders"
            )));
        }
        Ok(Self {
            name,
            session,
            command: template.render_plain()?,
            read_after: false,
        })
    }

    /// Read and discard one response after invoking.
    pub fn with_read_after(mut self, enabled: bool) -> Self {
        self.read_after = enabled;
        self
    }

    pub fn invoke(&self) -> ParamResult<()> {
        debug!(command = %self.name, "invoke");
        if self.read_after {
            self.session.query(&self.command).map(|_| ())
        } else {
            self.session.write(&self.command)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

// =============================================================================
// Identification
// =============================================================================

/// Parsed `*IDN?` response: `vendor,model,serial,revision[,extra...]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identification {
    pub vendor: String,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub revision: Option<String>,
    /// Fields past the fourth, joined by a space.
    pub others: Option<String>,
}

impl Identification {
    pub fn parse(response: &str) -> Self {
        let mut fields = response.split(',').map(|f| f.trim().to_string());
        let vendor = fields.next().unwrap_or_default();
        let model = fields.next();
        let serial = fields.next();
        let revision = fields.next();
        let rest: Vec<String> = fields.filter(|f| !f.is_empty()).collect();
        Self {
            vendor,
            model,
            serial,
            revision,
            others: (!rest.is_empty()).then(|| rest.join(" ")),
        }
    }
}

impl fmt::Display for Identification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.vendor)?;
        for field in [&self.model, &self.serial, &self.revision, &self.others]
            .into_iter()
            .flatten()
        {
            write!(f, ",{field}")?;
        }
        Ok(())
    }
}

impl ParamValue for Identification {
    fn to_value(&self) -> Value {
        Value::Str(self.to_string())
    }

    fn decode_text(text: &str) -> Result<Self, String> {
        Ok(Identification::parse(text))
    }

    fn encode_text(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MockAdapter, MockLog};
    use crate::session::SessionConfig;
    use crate::validation::{IntRange, NumberRange};
    use tracing_test::traced_test;

    fn mock(adapter: MockAdapter) -> (Arc<Session>, MockLog) {
        let log = adapter.log();
        let session = Session::with_transport(
            "MOCK0::INSTR",
            Box::new(adapter),
            SessionConfig::default().with_timeout(Duration::from_millis(200)),
        );
        (Arc::new(session), log)
    }

    #[test]
    fn test_template_checks_at_build() {
        let (session, _) = mock(MockAdapter::new());

        let err = Parameter::<f64>::builder("volt", Arc::clone(&session))
            .get_cmd("VOLT? {value}")
            .build()
            .unwrap_err();
        assert!(matches!(err, ParamError::Template(_)));

        let err = Parameter::<f64>::builder("volt", Arc::clone(&session))
            .set_cmd("VOLT")
            .build()
            .unwrap_err();
        assert!(matches!(err, ParamError::Template(_)));

        let err = Parameter::<f64>::builder("volt", Arc::clone(&session))
            .set_cmd("VOLT {value} {value}")
            .build()
            .unwrap_err();
        assert!(matches!(err, ParamError::Template(_)));

        let err = Parameter::<f64>::builder("volt", session)
            .get_cmd("VOLT{index}?")
            .build()
            .unwrap_err();
        assert!(matches!(err, ParamError::Template(_)));
    }

    #[test]
    fn test_call_dispatches_on_argument() {
        let (session, log) = mock(MockAdapter::new().with_response("CURR?", "0.125"));
        let current = Parameter::<f64>::builder("current", session)
            .get_cmd("CURR?")
            .set_cmd("CURR {:.3}")
            .build()
            .unwrap();

        assert_eq!(current.call(None).unwrap(), Some(0.125));
        assert_eq!(current.call(Some(0.5)).unwrap(), None);
        assert_eq!(log.writes(), vec!["CURR?", "CURR 0.500"]);
        assert_eq!(current.cached(), Some(0.5));
    }

    #[test]
    fn test_rejected_set_writes_nothing() {
        let (session, log) = mock(MockAdapter::new());
        let count = Parameter::<i64>::builder("count", session)
            .set_cmd("COUN {}")
            .validator(IntRange::between(1, 10).unwrap())
            .build()
            .unwrap();

        let err = count.set(11).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(log.write_count(), 0);
        assert_eq!(count.cached(), None);
    }

    #[test]
    fn test_read_only_with_set_template() {
        let (session, log) = mock(MockAdapter::new());
        let power = Parameter::<f64>::builder("power", session)
            .get_cmd("POW?")
            .set_cmd("POW {}")
            .read_only()
            .build()
            .unwrap();

        assert!(matches!(power.set(1.0), Err(ParamError::Usage(_))));
        assert!(!power.is_settable());
        assert_eq!(log.write_count(), 0);
    }

    #[test]
    fn test_get_without_template_is_usage_error() {
        let (session, _) = mock(MockAdapter::new());
        let trigger = Parameter::<bool>::builder("trigger", session)
            .set_cmd("TRIG {}")
            .build()
            .unwrap();
        assert!(matches!(trigger.get(), Err(ParamError::Usage(_))));
    }

    #[test]
    fn test_undecodable_response() {
        let (session, _) = mock(MockAdapter::new().with_response("FREQ?", "n/a"));
        let freq = Parameter::<f64>::builder("freq", session)
            .get_cmd("FREQ?")
            .build()
            .unwrap();
        match freq.get().unwrap_err() {
            ParamError::Decode { response, .. } => assert_eq!(response, "n/a"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_enforced_read_policy() {
        let (session, _) = mock(MockAdapter::new().with_response("TEMP?", "451"));
        let temp = Parameter::<f64>::builder("temp", session)
            .get_cmd("TEMP?")
            .validator(NumberRange::between(0.0, 100.0).unwrap())
            .read_policy(ReadPolicy::Enforce)
            .build()
            .unwrap();
        assert!(temp.get().unwrap_err().is_validation());
        assert_eq!(temp.cached(), None);
    }

    #[test]
    #[traced_test]
    fn test_observed_violation_is_logged() {
        let (session, _) = mock(MockAdapter::new().with_response("TEMP?", "451"));
        let temp = Parameter::<f64>::builder("temp", session)
            .get_cmd("TEMP?")
            .validator(NumberRange::between(0.0, 100.0).unwrap())
            .build()
            .unwrap();

        assert_eq!(temp.get().unwrap(), 451.0);
        assert_eq!(temp.cached(), Some(451.0));
        assert!(logs_contain("instrument reported a value outside the validator"));
    }

    #[test]
    fn test_pre_post_and_acknowledged_writes() {
        let adapter = MockAdapter::new()
            .with_response("SYST:REM", "OK")
            .with_response("OUTP 1", "OK")
            .with_response("SYST:LOC", "OK");
        let (session, log) = mock(adapter);
        let output = Parameter::<bool>::builder("output", session)
            .set_cmd("OUTP {}")
            .pre_cmd("SYST:REM")
            .post_cmd("SYST:LOC")
            .read_after_setting(true)
            .build()
            .unwrap();

        output.set(true).unwrap();
        assert_eq!(log.writes(), vec!["SYST:REM", "OUTP 1", "SYST:LOC"]);
    }

    #[test]
    fn test_custom_codec() {
        let (session, log) = mock(MockAdapter::new().with_response("MODE?", "REMOTE"));
        let remote = Parameter::<bool>::builder("remote", session)
            .get_cmd("MODE?")
            .set_cmd("MODE {}")
            .decoder(|text| Ok(text.trim() == "REMOTE"))
            .encoder(|on| if *on { "REMOTE".into() } else { "LOCAL".into() })
            .build()
            .unwrap();

        assert!(remote.get().unwrap());
        remote.set(false).unwrap();
        assert_eq!(log.writes().last().map(String::as_str), Some("MODE LOCAL"));
    }

    #[test]
    fn test_bind_index() {
        let (session, _) = mock(MockAdapter::new());
        let builder = Parameter::<f64>::builder("ch{index}_level", session)
            .get_cmd("LEV? {index}")
            .set_cmd("LEV {index},{value}");
        let bound = builder.bind("index", 4).unwrap().build().unwrap();
        assert_eq!(bound.name(), "ch4_level");
        assert_eq!(bound.get_cmd().unwrap().render_plain().unwrap(), "LEV? 4");
        assert_eq!(bound.set_cmd().unwrap().render("1.5").unwrap(), "LEV 4,1.5");
    }

    #[test]
    fn test_snapshot_serializes() {
        let (session, _) = mock(MockAdapter::new().with_response("VOLT?", "2.5"));
        let volt = Parameter::<f64>::builder("volt", session)
            .get_cmd("VOLT?")
            .unit("V")
            .validator(NumberRange::between(0.0, 10.0).unwrap())
            .build()
            .unwrap();
        volt.get().unwrap();

        let snapshot = volt.snapshot();
        assert_eq!(snapshot.value, Some(Value::Float(2.5)));
        assert!(!snapshot.settable);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["unit"], "V");
        assert_eq!(json["get_cmd"], "VOLT?");
        assert_eq!(json["value"], 2.5);
    }

    #[test]
    fn test_dynamic_access() {
        let (session, log) = mock(MockAdapter::new().with_response("AVER?", "16"));
        let averages = Parameter::<u32>::builder("averages", session)
            .get_cmd("AVER?")
            .set_cmd("AVER {}")
            .build()
            .unwrap();
        let params: Vec<Box<dyn ParameterBase>> = vec![Box::new(averages)];

        assert_eq!(params[0].get_text().unwrap(), "16");
        params[0].set_text("32").unwrap();
        assert_eq!(log.writes().last().map(String::as_str), Some("AVER 32"));
        assert!(params[0].set_text("many").is_err());
    }

    #[test]
    fn test_command_and_identification() {
        let adapter = MockAdapter::new().with_response(
            "*IDN?",
            "Keysight Technologies, 33522B ,MY1234, 4.0-1.19, extra, bits",
        );
        let (session, log) = mock(adapter);

        let reset = Command::new("reset", Arc::clone(&session), "*RST").unwrap();
        reset.invoke().unwrap();
        assert!(Command::new("bad", Arc::clone(&session), "APPLY {}").is_err());

        let idn = Parameter::<Identification>::identification(session).unwrap();
        let info = idn.get().unwrap();
        assert_eq!(info.vendor, "Keysight Technologies");
        assert_eq!(info.model.as_deref(), Some("33522B"));
        assert_eq!(info.serial.as_deref(), Some("MY1234"));
        assert_eq!(info.revision.as_deref(), Some("4.0-1.19"));
        assert_eq!(info.others.as_deref(), Some("extra bits"));
        assert!(idn.set(info).is_err());
        assert_eq!(log.writes(), vec!["*RST", "*IDN?"]);
    }

    #[test]
    fn test_identification_short_response() {
        let info = Identification::parse("ACME");
        assert_eq!(info.vendor, "ACME");
        assert_eq!(info.model, None);
        assert_eq!(info.to_string(), "ACME");
    }
}
