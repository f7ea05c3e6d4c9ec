use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ExtoolsError;

static MODIFIER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<([A-Za-z0-9]+)>").expect("modifier token regex is valid"));

/// Modifier keys, in canonical output order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub shift: bool,
    pub control: bool,
    pub alt: bool,
    pub super_key: bool,
}

impl Modifiers {
    pub fn is_empty(&self) -> bool {
        !(self.shift || self.control || self.alt || self.super_key)
    }
}

/// A key combination such as `<Control><Shift>F5`.
///
/// Parsing accepts the usual aliases (`<Ctrl>`, `<Primary>`, `<Mod1>`,
/// `<Meta>`) and case-insensitive modifier names. `Display` always produces
/// the canonical form, so two spellings of the same combination compare and
/// print equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Accelerator {
    modifiers: Modifiers,
    key: String,
}

impl Accelerator {
    pub fn new(modifiers: Modifiers, key: &str) -> Result<Self, ExtoolsError> {
        let key = normalize_key(key)?;
        Ok(Self { modifiers, key })
    }

    /// Parse a stored shortcut string. Blank means "no shortcut".
    pub fn parse_optional(s: &str) -> Result<Option<Self>, ExtoolsError> {
        if s.trim().is_empty() {
            return Ok(None);
        }
        s.parse().map(Some)
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl FromStr for Accelerator {
    type Err = ExtoolsError;

    fn from_str(s: &str) -> Result<Self, ExtoolsError> {
        let mut rest = s.trim();
        let mut modifiers = Modifiers::default();

        while let Some(caps) = MODIFIER_TOKEN.captures(rest) {
            let token = &caps[1];
            match token.to_ascii_lowercase().as_str() {
                "shift" => modifiers.shift = true,
                "control" | "ctrl" | "ctl" | "primary" => modifiers.control = true,
                "alt" | "mod1" => modifiers.alt = true,
                "super" | "meta" => modifiers.super_key = true,
                _ => {
                    return Err(ExtoolsError::InvalidAccelerator(format!(
                        "'{s}': unknown modifier <{token}>"
                    )));
                }
            }
            rest = &rest[caps[0].len()..];
        }

        let key = normalize_key(rest)
            .map_err(|_| ExtoolsError::InvalidAccelerator(format!("'{s}': missing key")))?;
        Ok(Self { modifiers, key })
    }
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.shift {
            f.write_str("<Shift>")?;
        }
        if self.modifiers.control {
            f.write_str("<Control>")?;
        }
        if self.modifiers.alt {
            f.write_str("<Alt>")?;
        }
        if self.modifiers.super_key {
            f.write_str("<Super>")?;
        }
        f.write_str(&self.key)
    }
}

fn normalize_key(key: &str) -> Result<String, ExtoolsError> {
    let key = key.trim();
    if key.is_empty() || key.contains(['<', '>']) || key.chars().any(char::is_whitespace) {
        return Err(ExtoolsError::InvalidAccelerator(format!("bad key name '{key}'")));
    }
    // Single letters are stored lowercase; named keys keep their spelling.
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c.to_lowercase().collect()),
        _ => Ok(key.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_canonicalize() {
        let accel: Accelerator = "<Ctrl><Shift>R".parse().expect("should parse");
        assert!(accel.modifiers().control);
        assert!(accel.modifiers().shift);
        assert_eq!(accel.key(), "r");
        assert_eq!(accel.to_string(), "<Shift><Control>r");
    }

    #[test]
    fn aliases_compare_equal() {
        let a: Accelerator = "<Primary>F5".parse().unwrap();
        let b: Accelerator = "<control>F5".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn bare_key_is_valid() {
        let accel: Accelerator = "F9".parse().unwrap();
        assert!(accel.modifiers().is_empty());
        assert_eq!(accel.to_string(), "F9");
    }

    #[test]
    fn modifier_only_rejected() {
        let err = "<Control>".parse::<Accelerator>().unwrap_err();
        assert!(matches!(err, ExtoolsError::InvalidAccelerator(_)));
    }

    #[test]
    fn unknown_modifier_rejected() {
        let err = "<Hyperdrive>x".parse::<Accelerator>().unwrap_err();
        assert!(matches!(err, ExtoolsError::InvalidAccelerator(_)));
    }

    #[test]
    fn blank_is_no_shortcut() {
        assert_eq!(Accelerator::parse_optional("  ").unwrap(), None);
        assert!(Accelerator::parse_optional("<Alt>q").unwrap().is_some());
    }
}
