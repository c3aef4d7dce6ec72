//! Parses the `NGF_NATIVE_BINDING_MAP` comment block some text shader
//! sources embed, mapping `(set, binding)` to a backend-native binding
//! number.
//!
//! Grounded on `original_source/source/ngf-common/native-binding-map.c`.
//! Lives in the shared layer rather than a backend (the Vulkan-class
//! backend implemented here never consults the resulting map — Vulkan
//! descriptor sets already have their own `(set, binding)` addressing —
//! but a future Metal-class backend would, and nicegraf places the parser
//! in `ngf-common` for exactly that reason).

use std::collections::HashMap;

const MARKER: &str = "NGF_NATIVE_BINDING_MAP";
const TERMINATOR_SET: i64 = -1;
const TERMINATOR_BINDING: i64 = -1;
const TERMINATOR_NATIVE: i64 = -1;

#[derive(Debug, Clone, Default)]
pub struct NativeBindingMap {
    entries: HashMap<(u32, u32), u32>,
}

impl NativeBindingMap {
    pub fn native_binding_for(&self, set: u32, binding: u32) -> Option<u32> {
        self.entries.get(&(set, binding)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Scans `source` for the `NGF_NATIVE_BINDING_MAP` comment block and
    /// parses the `(set binding) : native_binding` triples up to the
    /// `(-1 -1) : -1` terminator. Returns `None` if the marker isn't
    /// present; a malformed block after the marker is parsed as far as
    /// possible and then stops (missing entries simply aren't mapped).
    pub fn parse(source: &str) -> Option<Self> {
        let marker_pos = source.find(MARKER)?;
        let rest = &source[marker_pos + MARKER.len()..];

        let mut entries = HashMap::new();
        let mut cursor = rest;
        loop {
            let Some((set, binding, native, remainder)) = parse_one_triple(cursor) else {
                break;
            };
            cursor = remainder;
            if set == TERMINATOR_SET && binding == TERMINATOR_BINDING && native == TERMINATOR_NATIVE
            {
                break;
            }
            if set < 0 || binding < 0 || native < 0 {
                break;
            }
            entries.insert((set as u32, binding as u32), native as u32);
        }
        Some(Self { entries })
    }
}

/// Parses one `(set binding) : native` triple starting at the first `(`
/// found in `s`, returning the parsed values and the remainder of the
/// string after the triple.
fn parse_one_triple(s: &str) -> Option<(i64, i64, i64, &str)> {
    let open = s.find('(')?;
    let close = s[open..].find(')')? + open;
    let inside = s[open + 1..close].trim();
    let mut parts = inside.split_whitespace();
    let set: i64 = parts.next()?.parse().ok()?;
    let binding: i64 = parts.next()?.parse().ok()?;

    let after_paren = &s[close + 1..];
    let colon = after_paren.find(':')?;
    let after_colon = &after_paren[colon + 1..];

    let native_str: String = after_colon
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    let native: i64 = native_str.parse().ok()?;
    let remainder = &after_colon[native_str.len()..];
    Some((set, binding, native, remainder))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_block() {
        let src = r#"
            /* NGF_NATIVE_BINDING_MAP
             * (0 0) : 0
             * (0 1) : 1
             * (1 0) : 2
             * (-1 -1) : -1
             */
            layout(set = 0, binding = 0) uniform UBO { mat4 mvp; };
        "#;
        let map = NativeBindingMap::parse(src).unwrap();
        assert_eq!(map.native_binding_for(0, 0), Some(0));
        assert_eq!(map.native_binding_for(0, 1), Some(1));
        assert_eq!(map.native_binding_for(1, 0), Some(2));
        assert_eq!(map.native_binding_for(9, 9), None);
    }

    #[test]
    fn absent_marker_returns_none() {
        assert!(NativeBindingMap::parse("plain glsl source, no marker here").is_none());
    }
}
