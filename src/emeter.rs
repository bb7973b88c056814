//! Semantic view over raw energy-meter device data (spec §3 "EmeterStatus").
//! Native keys (`voltage`, `current`, `power`, `total`) and their milli
//! variants (`voltage_mv`, `current_ma`, `power_mw`, `total_wh`) are two
//! views of the same reading; whichever is present wins, the other is
//! derived by a factor of 1000.

use serde_json::Value;

use crate::error::Error;

/// One emeter field's native/milli key pair (spec §3's unit suffix
/// convention).
struct FieldKeys {
    native: &'static str,
    milli: &'static str,
}

const VOLTAGE: FieldKeys = FieldKeys { native: "voltage", milli: "voltage_mv" };
const CURRENT: FieldKeys = FieldKeys { native: "current", milli: "current_ma" };
const POWER: FieldKeys = FieldKeys { native: "power", milli: "power_mw" };
const TOTAL: FieldKeys = FieldKeys { native: "total", milli: "total_wh" };

/// Wraps a raw `get_realtime`/`get_monthstat` style JSON object, exposing
/// auto-scaling accessors (spec §8: "for a record containing both `voltage`
/// and `voltage_mv`, `voltage == raw["voltage"]`").
pub struct EmeterStatus<'a> {
    raw: &'a Value,
}

impl<'a> EmeterStatus<'a> {
    pub fn new(raw: &'a Value) -> Self {
        Self { raw }
    }

    fn native(&self, keys: &FieldKeys) -> Result<Option<f64>, Error> {
        if let Some(v) = self.raw.get(keys.native) {
            return as_f64(v, keys.native).map(Some);
        }
        if let Some(v) = self.raw.get(keys.milli) {
            return as_f64(v, keys.milli).map(|milli| Some(milli / 1000.0));
        }
        Ok(None)
    }

    fn milli(&self, keys: &FieldKeys) -> Result<Option<f64>, Error> {
        if let Some(v) = self.raw.get(keys.milli) {
            return as_f64(v, keys.milli).map(Some);
        }
        if let Some(v) = self.raw.get(keys.native) {
            return as_f64(v, keys.native).map(|native| Some(native * 1000.0));
        }
        Ok(None)
    }

    /// `None` means the key is genuinely absent from `raw` (neither the
    /// native nor milli form is present) — spec §3 "Missing key -> null".
    pub fn voltage(&self) -> Result<Option<f64>, Error> {
        self.native(&VOLTAGE)
    }

    pub fn voltage_mv(&self) -> Result<Option<f64>, Error> {
        self.milli(&VOLTAGE)
    }

    pub fn current(&self) -> Result<Option<f64>, Error> {
        self.native(&CURRENT)
    }

    pub fn current_ma(&self) -> Result<Option<f64>, Error> {
        self.milli(&CURRENT)
    }

    pub fn power(&self) -> Result<Option<f64>, Error> {
        self.native(&POWER)
    }

    pub fn power_mw(&self) -> Result<Option<f64>, Error> {
        self.milli(&POWER)
    }

    pub fn total(&self) -> Result<Option<f64>, Error> {
        self.native(&TOTAL)
    }

    pub fn total_wh(&self) -> Result<Option<f64>, Error> {
        self.milli(&TOTAL)
    }

    /// Looks up an arbitrary key by name, for callers that want a field
    /// this wrapper doesn't special-case. Unlike the typed accessors, an
    /// unknown key is a lookup error rather than `None` (spec §8: "unknown
    /// key -> lookup error").
    pub fn get(&self, key: &str) -> Result<f64, Error> {
        match key {
            "voltage" => self.voltage(),
            "voltage_mv" => self.voltage_mv(),
            "current" => self.current(),
            "current_ma" => self.current_ma(),
            "power" => self.power(),
            "power_mw" => self.power_mw(),
            "total" => self.total(),
            "total_wh" => self.total_wh(),
            _ => return Err(Error::Internal(format!("unknown emeter key {key:?}"))),
        }?
        .ok_or_else(|| Error::Internal(format!("emeter key {key:?} not present in this reading")))
    }
}

fn as_f64(value: &Value, field: &str) -> Result<f64, Error> {
    value
        .as_f64()
        .ok_or_else(|| Error::Internal(format!("emeter field {field:?} was not numeric")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn native_key_wins_when_both_present() {
        let raw = json!({"voltage": 230.0, "voltage_mv": 999999.0});
        let status = EmeterStatus::new(&raw);
        assert_eq!(status.voltage().unwrap(), Some(230.0));
    }

    #[test]
    fn milli_key_derives_native_by_dividing() {
        let raw = json!({"voltage_mv": 230000.0});
        let status = EmeterStatus::new(&raw);
        assert_eq!(status.voltage().unwrap(), Some(230.0));
    }

    #[test]
    fn native_key_derives_milli_by_multiplying() {
        let raw = json!({"current": 0.5});
        let status = EmeterStatus::new(&raw);
        assert_eq!(status.current_ma().unwrap(), Some(500.0));
    }

    #[test]
    fn missing_field_is_none() {
        let raw = json!({});
        let status = EmeterStatus::new(&raw);
        assert_eq!(status.power().unwrap(), None);
    }

    #[test]
    fn unknown_key_is_a_lookup_error() {
        let raw = json!({"voltage": 230.0});
        let status = EmeterStatus::new(&raw);
        assert!(status.get("bogus_field").is_err());
    }

    #[test]
    fn get_by_name_matches_typed_accessor() {
        let raw = json!({"power": 12.5});
        let status = EmeterStatus::new(&raw);
        assert_eq!(status.get("power").unwrap(), 12.5);
    }
}
