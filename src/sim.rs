//! Simulated instruments.
//!
//! A simulated instrument is described in YAML
//! with static dialogues, stateful properties with getter/setter commands,
//! and per-channel properties. Resources map instrument addresses to devices,
//! so a session opened on `ASRL1::INSTR` with a simulated backend talks to the
//! device registered for that address.
//!
//! ```yaml
//! devices:
//!   psu:
//!     eom: { query: "\n", response: "\n" }
//!     error: ERROR
//!     dialogues:
//!       - { q: "*IDN?", r: "ACME,PSU,1,1.0" }
//!     properties:
//!       voltage:
//!         default: 0.0
//!         getter: { q: "VOLT?", r: "{}" }
//!         setter: { q: "VOLT {}" }
//! resources:
//!   "ASRL1::INSTR": { device: psu }
//! ```

use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use tracing::{debug, trace};

use crate::error::{ParamError, ParamResult};

/// Description shipped with the crate, used when no file is given.
pub const DEFAULT_DESCRIPTION: &str = include_str!("../sim/default.yaml");

const CHANNEL_ID: &str = "{ch_id}";
const VALUE_MARK: &str = "{}";

fn newline() -> String {
    "\n".to_string()
}

/// Parsed simulated-instrument description.
#[derive(Debug, Clone, Deserialize)]
pub struct SimDescription {
    #[serde(default)]
    pub spec: Option<String>,
    devices: BTreeMap<String, DeviceSpec>,
    resources: BTreeMap<String, ResourceSpec>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResourceSpec {
    device: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DeviceSpec {
    #[serde(default)]
    eom: Eom,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    dialogues: Vec<Dialogue>,
    #[serde(default)]
    properties: BTreeMap<String, PropertySpec>,
    #[serde(default)]
    channels: BTreeMap<String, ChannelSpec>,
}

#[derive(Debug, Clone, Deserialize)]
struct Eom {
    #[serde(default = "newline")]
    query: String,
    #[serde(default = "newline")]
    response: String,
}

impl Default for Eom {
    fn default() -> Self {
        Self {
            query: newline(),
            response: newline(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Dialogue {
    q: String,
    #[serde(default)]
    r: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct Exchange {
    q: String,
    #[serde(default)]
    r: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct PropertySpec {
    #[serde(default)]
    default: serde_yaml::Value,
    #[serde(default)]
    getter: Option<Exchange>,
    #[serde(default)]
    setter: Option<Exchange>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChannelSpec {
    ids: Vec<serde_yaml::Value>,
    #[serde(default)]
    default: serde_yaml::Value,
    #[serde(default)]
    getter: Option<Exchange>,
    #[serde(default)]
    setter: Option<Exchange>,
}

fn scalar_text(value: &serde_yaml::Value) -> ParamResult<String> {
    match value {
        serde_yaml::Value::Null => Ok(String::new()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::String(s) => Ok(s.clone()),
        other => Err(ParamError::Simulation(format!(
            "expected a scalar, found {other:?}"
        ))),
    }
}

impl SimDescription {
    pub fn from_yaml(text: &str) -> ParamResult<Self> {
        let description: SimDescription = serde_yaml::from_str(text)
            .map_err(|e| ParamError::Simulation(format!("invalid description: {e}")))?;
        for (resource, spec) in &description.resources {
            if !description.devices.contains_key(&spec.device) {
                return Err(ParamError::Simulation(format!(
                    "resource '{resource}' refers to unknown device '{}'",
                    spec.device
                )));
            }
        }
        Ok(description)
    }

    pub fn load(path: &Path) -> ParamResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ParamError::Simulation(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }

    /// Addresses served by this description.
    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Fresh device state for the instrument registered at `resource`.
    pub fn instantiate(&self, resource: &str) -> ParamResult<SimDevice> {
        let spec = self
            .resources
            .iter()
            .find(|(address, _)| address.eq_ignore_ascii_case(resource))
            .map(|(_, spec)| spec)
            .ok_or_else(|| {
                ParamError::Simulation(format!("no simulated device at '{resource}'"))
            })?;
        let device = self.devices.get(&spec.device).ok_or_else(|| {
            ParamError::Simulation(format!("unknown device '{}'", spec.device))
        })?;
        SimDevice::build(&spec.device, device)
    }
}

#[derive(Debug)]
struct Getter {
    query: String,
    reply: String,
    key: String,
}

#[derive(Debug)]
struct Setter {
    matcher: Regex,
    reply: Option<String>,
    key: String,
}

/// Runtime state of one simulated instrument.
#[derive(Debug)]
pub struct SimDevice {
    name: String,
    query_eom: String,
    response_eom: String,
    error: Option<String>,
    dialogues: HashMap<String, Option<String>>,
    getters: Vec<Getter>,
    setters: Vec<Setter>,
    values: HashMap<String, String>,
    input: Vec<u8>,
    output: VecDeque<u8>,
}

impl SimDevice {
    fn build(name: &str, spec: &DeviceSpec) -> ParamResult<Self> {
        let mut device = SimDevice {
            name: name.to_string(),
            query_eom: spec.eom.query.clone(),
            response_eom: spec.eom.response.clone(),
            error: spec.error.clone(),
            dialogues: HashMap::new(),
            getters: Vec::new(),
            setters: Vec::new(),
            values: HashMap::new(),
            input: Vec::new(),
            output: VecDeque::new(),
        };

        for dialogue in &spec.dialogues {
            let reply = dialogue.r.as_ref().map(scalar_text).transpose()?;
            device
                .dialogues
                .insert(dialogue.q.trim().to_string(), reply);
        }
        for (prop, p) in &spec.properties {
            device.register(prop.clone(), None, &p.default, &p.getter, &p.setter)?;
        }
        for (prop, c) in &spec.channels {
            for id in &c.ids {
                let id = scalar_text(id)?;
                device.register(
                    format!("{prop}[{id}]"),
                    Some(&id),
                    &c.default,
                    &c.getter,
                    &c.setter,
                )?;
            }
        }
        Ok(device)
    }

    fn register(
        &mut self,
        key: String,
        channel: Option<&str>,
        default: &serde_yaml::Value,
        getter: &Option<Exchange>,
        setter: &Option<Exchange>,
    ) -> ParamResult<()> {
        let with_channel = |q: &str| match channel {
            Some(id) => q.replace(CHANNEL_ID, id),
            None => q.to_string(),
        };

        self.values.insert(key.clone(), scalar_text(default)?);
        if let Some(g) = getter {
            let reply = match &g.r {
                Some(r) => scalar_text(r)?,
                None => VALUE_MARK.to_string(),
            };
            self.getters.push(Getter {
                query: with_channel(&g.q).trim().to_string(),
                reply,
                key: key.clone(),
            });
        }
        if let Some(s) = setter {
            let q = with_channel(&s.q);
            let (before, after) = q.trim().split_once(VALUE_MARK).ok_or_else(|| {
                ParamError::Simulation(format!("setter '{}' has no '{{}}' slot", s.q))
            })?;
            let matcher = Regex::new(&format!(
                "^{}(.+?){}$",
                regex::escape(before),
                regex::escape(after)
            ))
            .map_err(|e| ParamError::Simulation(format!("setter '{}': {e}", s.q)))?;
            let reply = s.r.as_ref().map(scalar_text).transpose()?;
            self.setters.push(Setter {
                matcher,
                reply,
                key,
            });
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value of a property, `"prop"` or `"prop[ch_id]"`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn respond(&mut self, message: &str) -> Option<String> {
        let message = message.trim();
        if let Some(reply) = self.dialogues.get(message) {
            return reply.clone();
        }
        if let Some(g) = self.getters.iter().find(|g| g.query == message) {
            let value = self.values.get(&g.key).cloned().unwrap_or_default();
            return Some(g.reply.replace(VALUE_MARK, &value));
        }
        for s in &self.setters {
            if let Some(captures) = s.matcher.captures(message) {
                let value = captures
                    .get(1)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default();
                trace!(device = %self.name, key = %s.key, %value, "simulated set");
                self.values.insert(s.key.clone(), value);
                return s.reply.clone();
            }
        }
        debug!(device = %self.name, command = message, "unrecognized simulated command");
        self.error.clone()
    }

    fn emit(&mut self, reply: String) {
        self.output.extend(reply.as_bytes());
        self.output.extend(self.response_eom.as_bytes());
    }

    /// Feed bytes written by the host.
    pub fn write(&mut self, data: &[u8]) {
        if self.query_eom.is_empty() {
            let message = String::from_utf8_lossy(data).into_owned();
            if let Some(reply) = self.respond(&message) {
                self.emit(reply);
            }
            return;
        }

        self.input.extend_from_slice(data);
        let eom = self.query_eom.clone().into_bytes();
        while let Some(pos) = find_subsequence(&self.input, &eom) {
            let frame: Vec<u8> = self.input.drain(..pos + eom.len()).collect();
            let message = String::from_utf8_lossy(&frame[..pos]).into_owned();
            if let Some(reply) = self.respond(&message) {
                self.emit(reply);
            }
        }
    }

    /// Move pending response bytes into `buf`.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.output.len());
        for (slot, byte) in buf.iter_mut().zip(self.output.drain(..n)) {
            *slot = byte;
        }
        n
    }

    pub fn has_output(&self) -> bool {
        !self.output.is_empty()
    }

    pub fn clear(&mut self) {
        self.input.clear();
        self.output.clear();
    }
}

/// Position of the first occurrence of `needle` in `haystack`.
pub(crate) fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PSU: &str = r#"
devices:
  psu:
    error: ERROR
    dialogues:
      - { q: "*IDN?", r: "ACME,PSU,42,1.0" }
      - { q: "*CLS" }
    properties:
      voltage:
        default: 1.5
        getter: { q: "VOLT?", r: "{}" }
        setter: { q: "VOLT {}", r: "OK" }
    channels:
      output:
        ids: [1, 2]
        default: "OFF"
        getter: { q: "OUTP? {ch_id}", r: "{}" }
        setter: { q: "OUTP {ch_id} {}" }
resources:
  "ASRL1::INSTR": { device: psu }
"#;

    fn read_all(device: &mut SimDevice) -> String {
        let mut buf = [0u8; 256];
        let n = device.read(&mut buf);
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[test]
    fn test_dialogue_and_property_roundtrip() {
        let description = SimDescription::from_yaml(PSU).unwrap();
        let mut device = description.instantiate("asrl1::instr").unwrap();

        device.write(b"*IDN?\n");
        assert_eq!(read_all(&mut device), "ACME,PSU,42,1.0\n");

        device.write(b"VOLT?\n");
        assert_eq!(read_all(&mut device), "1.5\n");

        device.write(b"VOLT 3.25\n");
        assert_eq!(read_all(&mut device), "OK\n");
        assert_eq!(device.value("voltage"), Some("3.25"));
    }

    #[test]
    fn test_channels_are_independent() {
        let description = SimDescription::from_yaml(PSU).unwrap();
        let mut device = description.instantiate("ASRL1::INSTR").unwrap();

        device.write(b"OUTP 2 ON\n");
        assert!(!device.has_output());
        device.write(b"OUTP? 1\nOUTP? 2\n");
        assert_eq!(read_all(&mut device), "OFF\nON\n");
    }

    #[test]
    fn test_partial_frames_wait_for_eom() {
        let description = SimDescription::from_yaml(PSU).unwrap();
        let mut device = description.instantiate("ASRL1::INSTR").unwrap();

        device.write(b"*ID");
        assert!(!device.has_output());
        device.write(b"N?\n");
        assert!(device.has_output());
    }

    #[test]
    fn test_unknown_command_and_resource() {
        let description = SimDescription::from_yaml(PSU).unwrap();
        let mut device = description.instantiate("ASRL1::INSTR").unwrap();
        device.write(b"*CLS\n");
        assert!(!device.has_output());
        device.write(b"BOGUS\n");
        assert_eq!(read_all(&mut device), "ERROR\n");

        assert!(description.instantiate("GPIB0::1::INSTR").is_err());
    }

    #[test]
    fn test_invalid_descriptions() {
        let dangling = "devices: {}\nresources:\n  X: { device: nope }\n";
        assert!(SimDescription::from_yaml(dangling).is_err());
        assert!(SimDescription::from_yaml("devices: [").is_err());
    }

    #[test]
    fn test_default_description_parses() {
        let description = SimDescription::from_yaml(DEFAULT_DESCRIPTION).unwrap();
        assert!(description.resources().count() >= 1);
    }

    #[test]
    fn test_find_subsequence() {
        assert_eq!(find_subsequence(b"abc\r\nrest", b"\r\n"), Some(3));
        assert_eq!(find_subsequence(b"abc", b""), None);
        assert_eq!(find_subsequence(b"a", b"abc"), None);
    }
}
