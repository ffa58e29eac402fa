//! Signal tables
//!
//! Six name→value maps, one per signal direction and kind. Buffer inputs
//! live in the string-input map but append instead of replacing. Keys keep
//! the declared spelling (`levels[2]`); lookups are case-insensitive.

use crate::observer::SignalKind;
use crate::scope::{MAX_STRING_CAPACITY, SlotKey};
use crate::value::{IntWidth, Value};
use splusc::ast::IoType;
use std::collections::{BTreeMap, HashMap};

/// Metadata for one expanded signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoSignal {
    pub io_type: IoType,
    /// Declared spelling, including `[i]` for array elements
    pub name: String,
    pub capacity: Option<usize>,
}

impl IoSignal {
    pub fn kind(&self) -> SignalKind {
        match self.io_type {
            IoType::DigitalInput | IoType::DigitalOutput => SignalKind::Digital,
            IoType::AnalogInput | IoType::AnalogOutput => SignalKind::Analog,
            _ => SignalKind::Serial,
        }
    }

    /// Array base name when the signal is an element (`levels[2]` → `levels`)
    pub fn base_name(&self) -> Option<&str> {
        self.name.split_once('[').map(|(base, _)| base)
    }

    pub fn index(&self) -> Option<i64> {
        let (_, rest) = self.name.split_once('[')?;
        rest.trim_end_matches(']').parse().ok()
    }

    /// Normalize a value the way the signal stores it
    pub fn coerce(&self, value: Value) -> Value {
        match self.kind() {
            SignalKind::Digital => Value::from_bool(value.as_number() != 0),
            SignalKind::Analog => Value::Number(IntWidth::U16.wrap(value.as_number())),
            SignalKind::Serial => {
                let capacity = self.capacity.unwrap_or(MAX_STRING_CAPACITY);
                Value::Text(value.as_text().chars().take(capacity).collect())
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IoState {
    digital_inputs: BTreeMap<String, Value>,
    digital_outputs: BTreeMap<String, Value>,
    analog_inputs: BTreeMap<String, Value>,
    analog_outputs: BTreeMap<String, Value>,
    string_inputs: BTreeMap<String, Value>,
    string_outputs: BTreeMap<String, Value>,
    /// Uppercase name → signal
    signals: HashMap<String, IoSignal>,
    /// Declaration order, for load summaries
    order: Vec<String>,
}

impl IoState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, io_type: IoType, name: &str, capacity: Option<usize>) {
        let signal = IoSignal {
            io_type,
            name: name.to_string(),
            capacity,
        };
        let initial = if signal.kind() == SignalKind::Serial {
            Value::empty_text()
        } else {
            Value::zero()
        };
        self.map_mut(io_type).insert(name.to_string(), initial);
        self.signals.insert(name.to_ascii_uppercase(), signal);
        self.order.push(name.to_string());
    }

    pub fn signal(&self, name: &str) -> Option<&IoSignal> {
        self.signals.get(&name.to_ascii_uppercase())
    }

    /// Signal addressed by a plain or single-index slot key
    pub fn signal_for_key(&self, key: &SlotKey) -> Option<&IoSignal> {
        match key {
            SlotKey::Plain(n) => self.signals.get(n),
            SlotKey::Indexed(n, i) => self.signals.get(&format!("{}[{}]", n, i)),
            _ => None,
        }
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        let signal = self.signal(name)?;
        self.map(signal.io_type).get(&signal.name)
    }

    /// Store a value already normalized by [`IoSignal::coerce`]
    pub(crate) fn store(&mut self, signal: &IoSignal, value: Value) {
        self.map_mut(signal.io_type)
            .insert(signal.name.clone(), value);
    }

    pub fn declared_names(&self) -> &[String] {
        &self.order
    }

    pub fn digital_inputs(&self) -> &BTreeMap<String, Value> {
        &self.digital_inputs
    }

    pub fn digital_outputs(&self) -> &BTreeMap<String, Value> {
        &self.digital_outputs
    }

    pub fn analog_inputs(&self) -> &BTreeMap<String, Value> {
        &self.analog_inputs
    }

    pub fn analog_outputs(&self) -> &BTreeMap<String, Value> {
        &self.analog_outputs
    }

    /// String and buffer inputs
    pub fn string_inputs(&self) -> &BTreeMap<String, Value> {
        &self.string_inputs
    }

    pub fn string_outputs(&self) -> &BTreeMap<String, Value> {
        &self.string_outputs
    }

    pub fn clear(&mut self) {
        *self = IoState::default();
    }

    fn map(&self, io_type: IoType) -> &BTreeMap<String, Value> {
        match io_type {
            IoType::DigitalInput => &self.digital_inputs,
            IoType::DigitalOutput => &self.digital_outputs,
            IoType::AnalogInput => &self.analog_inputs,
            IoType::AnalogOutput => &self.analog_outputs,
            IoType::StringInput | IoType::BufferInput => &self.string_inputs,
            IoType::StringOutput => &self.string_outputs,
        }
    }

    fn map_mut(&mut self, io_type: IoType) -> &mut BTreeMap<String, Value> {
        match io_type {
            IoType::DigitalInput => &mut self.digital_inputs,
            IoType::DigitalOutput => &mut self.digital_outputs,
            IoType::AnalogInput => &mut self.analog_inputs,
            IoType::AnalogOutput => &mut self.analog_outputs,
            IoType::StringInput | IoType::BufferInput => &mut self.string_inputs,
            IoType::StringOutput => &mut self.string_outputs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_and_lookup_case_insensitive() {
        let mut io = IoState::new();
        io.declare(IoType::AnalogInput, "levels[2]", None);
        io.declare(IoType::StringOutput, "status", Some(4));

        let signal = io.signal("LEVELS[2]").unwrap();
        assert_eq!(signal.base_name(), Some("levels"));
        assert_eq!(signal.index(), Some(2));
        assert_eq!(io.analog_inputs().get("levels[2]"), Some(&Value::Number(0)));
        assert_eq!(io.value("STATUS"), Some(&Value::empty_text()));
        assert!(io.signal_for_key(&SlotKey::indexed("levels", 2)).is_some());
    }

    #[test]
    fn test_signal_coercion() {
        let mut io = IoState::new();
        io.declare(IoType::DigitalOutput, "lamp", None);
        io.declare(IoType::AnalogOutput, "volume", None);
        io.declare(IoType::StringOutput, "text", Some(3));

        assert_eq!(io.signal("lamp").unwrap().coerce(Value::Number(7)), Value::Number(1));
        assert_eq!(
            io.signal("volume").unwrap().coerce(Value::Number(65536 + 5)),
            Value::Number(5)
        );
        assert_eq!(
            io.signal("text").unwrap().coerce(Value::from("abcdef")),
            Value::from("abc")
        );
    }

    #[test]
    fn test_buffer_inputs_share_the_string_input_map() {
        let mut io = IoState::new();
        io.declare(IoType::BufferInput, "rx", Some(100));
        let signal = io.signal("rx").unwrap().clone();
        io.store(&signal, Value::from("abc"));
        assert_eq!(io.string_inputs().get("rx"), Some(&Value::from("abc")));
    }
}
