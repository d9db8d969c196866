//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Case-insensitive property lookup on gateway views."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use serde_json::Value;

/// Lookup of view fields by their public (PascalCase) name, ignoring ASCII case.
pub trait PropertyAccess {
    /// Public names in declaration order.
    fn property_names() -> &'static [&'static str]
    where
        Self: Sized;

    fn property(&self, name: &str) -> Option<Value>;

    fn has_property(name: &str) -> bool
    where
        Self: Sized,
    {
        Self::property_names()
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(name))
    }
}

/// Find `name` in `names` ignoring ASCII case and return the canonical spelling.
pub fn canonical_name(names: &'static [&'static str], name: &str) -> Option<&'static str> {
    names
        .iter()
        .copied()
        .find(|candidate| candidate.eq_ignore_ascii_case(name))
}

/// Implement [`PropertyAccess`] through an explicit name to field table.
///
/// ```ignore
/// view_properties!(TotalData {
///     "ActivePowerPlus" => active_power_plus,
///     "PowerFactor" => power_factor,
/// });
/// ```
#[macro_export]
macro_rules! view_properties {
    ($ty:ty { $($name:literal => $field:ident),+ $(,)? }) => {
        impl $crate::property::PropertyAccess for $ty {
            fn property_names() -> &'static [&'static str] {
                &[$($name),+]
            }

            fn property(&self, name: &str) -> Option<$crate::serde_json::Value> {
                $(
                    if name.eq_ignore_ascii_case($name) {
                        return $crate::serde_json::to_value(&self.$field).ok();
                    }
                )+
                None
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Sample {
        active_power: f64,
        state: String,
    }

    crate::view_properties!(Sample {
        "ActivePower" => active_power,
        "State" => state,
    });

    #[test]
    fn lookup_ignores_case() {
        let sample = Sample {
            active_power: 1250.5,
            state: "Charging".into(),
        };
        assert_eq!(sample.property("activepower"), Some(Value::from(1250.5)));
        assert_eq!(sample.property("STATE"), Some(Value::from("Charging")));
        assert_eq!(sample.property("Unknown"), None);
        assert!(Sample::has_property("aCtIvEpOwEr"));
        assert!(!Sample::has_property("ActivePowerPlus"));
        assert_eq!(Sample::property_names(), &["ActivePower", "State"]);
    }

    #[test]
    fn canonical_name_returns_declared_spelling() {
        const NAMES: &[&str] = &["HotwaterTarget", "RoomTarget"];
        assert_eq!(canonical_name(NAMES, "roomtarget"), Some("RoomTarget"));
        assert_eq!(canonical_name(NAMES, "room"), None);
    }
}
