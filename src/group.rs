//! Per-channel parameter groups.
//!
//! Multi-channel instruments expose one quantity per channel behind commands
//! that differ only by the channel number (`ATTN? 3`, `ATTN 3 0.5`). A
//! [`ChannelGroup`] reads the channel count through another parameter and
//! stamps out one [`Parameter`] per channel from a builder whose name and
//! commands contain an `{index}` placeholder. Channels are numbered from 1.

use std::collections::HashSet;
use tracing::info;

use crate::error::{ParamError, ParamResult};
use crate::parameter::{Parameter, ParameterBuilder, ParameterSnapshot};
use crate::validation::{IntRange, Validator};
use crate::value::{ParamValue, Value};

/// Placeholder bound to the channel number.
pub const INDEX_SLOT: &str = "index";

#[derive(Debug)]
pub struct ChannelGroup<T: ParamValue> {
    channels: Vec<Parameter<T>>,
}

impl<T: ParamValue> ChannelGroup<T> {
    /// Read the channel count through `count` and build one parameter per channel.
    ///
    /// The count must be a non-negative integer.
    pub fn build<C: ParamValue>(count: &Parameter<C>, template: &ParameterBuilder<T>) -> ParamResult<Self> {
        let reported = count.get()?.to_value();
        IntRange::at_least(0)
            .validate(&reported)
            .map_err(|e| ParamError::validation(count.name(), e))?;
        let n = match reported {
            Value::Int(n) => usize::try_from(n)
                .map_err(|e| ParamError::Usage(format!("channel count {n}: {e}")))?,
            other => {
                return Err(ParamError::Usage(format!(
                    "channel count must be an integer, got {other}"
                )))
            }
        };
        info!(group = template.name(), channels = n, "building channel group");
        Self::with_count(n, template)
    }

    /// Build `count` channels without asking the instrument.
    pub fn with_count(count: usize, template: &ParameterBuilder<T>) -> ParamResult<Self> {
        let mut names = HashSet::with_capacity(count);
        let mut channels = Vec::with_capacity(count);
        for index in 1..=count {
            let parameter = template.bind(INDEX_SLOT, index)?.build()?;
            if !names.insert(parameter.name().to_string()) {
                return Err(ParamError::Usage(format!(
                    "duplicate channel name '{}' (does the name contain {{{INDEX_SLOT}}}?)",
                    parameter.name()
                )));
            }
            channels.push(parameter);
        }
        Ok(Self { channels })
    }

    /// Channel `index`, counting from 1.
    pub fn channel(&self, index: usize) -> Option<&Parameter<T>> {
        index.checked_sub(1).and_then(|i| self.channels.get(i))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter<T>> {
        self.channels.iter()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.channels.iter().map(Parameter::name).collect()
    }

    /// Read every channel in order.
    pub fn get_all(&self) -> ParamResult<Vec<T>> {
        self.channels.iter().map(Parameter::get).collect()
    }

    pub fn snapshot(&self) -> Vec<ParameterSnapshot> {
        self.channels.iter().map(Parameter::snapshot).collect()
    }
}

impl<'a, T: ParamValue> IntoIterator for &'a ChannelGroup<T> {
    type Item = &'a Parameter<T>;
    type IntoIter = std::slice::Iter<'a, Parameter<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
