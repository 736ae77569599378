//! Character to virtual key code translation
//!
//! Table-driven mapping for the US ANSI layout, using the macOS
//! `kVK_ANSI_*` virtual key codes. Characters outside the table have no
//! mapping; callers skip bindings that need one.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A platform virtual key code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyCode(pub u16);

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// (character, virtual key code, accelerator key name)
const KEY_TABLE: &[(char, u16, &str)] = &[
    ('a', 0x00, "KeyA"),
    ('s', 0x01, "KeyS"),
    ('d', 0x02, "KeyD"),
    ('f', 0x03, "KeyF"),
    ('h', 0x04, "KeyH"),
    ('g', 0x05, "KeyG"),
    ('z', 0x06, "KeyZ"),
    ('x', 0x07, "KeyX"),
    ('c', 0x08, "KeyC"),
    ('v', 0x09, "KeyV"),
    ('b', 0x0B, "KeyB"),
    ('q', 0x0C, "KeyQ"),
    ('w', 0x0D, "KeyW"),
    ('e', 0x0E, "KeyE"),
    ('r', 0x0F, "KeyR"),
    ('y', 0x10, "KeyY"),
    ('t', 0x11, "KeyT"),
    ('1', 0x12, "Digit1"),
    ('2', 0x13, "Digit2"),
    ('3', 0x14, "Digit3"),
    ('4', 0x15, "Digit4"),
    ('6', 0x16, "Digit6"),
    ('5', 0x17, "Digit5"),
    ('=', 0x18, "Equal"),
    ('9', 0x19, "Digit9"),
    ('7', 0x1A, "Digit7"),
    ('-', 0x1B, "Minus"),
    ('8', 0x1C, "Digit8"),
    ('0', 0x1D, "Digit0"),
    (']', 0x1E, "BracketRight"),
    ('o', 0x1F, "KeyO"),
    ('u', 0x20, "KeyU"),
    ('[', 0x21, "BracketLeft"),
    ('i', 0x22, "KeyI"),
    ('p', 0x23, "KeyP"),
    ('l', 0x25, "KeyL"),
    ('j', 0x26, "KeyJ"),
    ('\'', 0x27, "Quote"),
    ('k', 0x28, "KeyK"),
    (';', 0x29, "Semicolon"),
    ('\\', 0x2A, "Backslash"),
    (',', 0x2B, "Comma"),
    ('/', 0x2C, "Slash"),
    ('n', 0x2D, "KeyN"),
    ('m', 0x2E, "KeyM"),
    ('.', 0x2F, "Period"),
    (' ', 0x31, "Space"),
    ('`', 0x32, "Backquote"),
];

fn normalize(character: char) -> char {
    character.to_ascii_lowercase()
}

/// Map a printable character to its key code
pub fn translate(character: char) -> Option<KeyCode> {
    let character = normalize(character);
    KEY_TABLE
        .iter()
        .find(|(c, _, _)| *c == character)
        .map(|(_, code, _)| KeyCode(*code))
}

/// Reverse lookup: the unshifted character a key code produces
pub fn character(key: KeyCode) -> Option<char> {
    KEY_TABLE
        .iter()
        .find(|(_, code, _)| *code == key.0)
        .map(|(c, _, _)| *c)
}

/// Accelerator key name for OS hotkey registration (e.g. `KeyS`)
pub fn accelerator_key(key: KeyCode) -> Option<&'static str> {
    KEY_TABLE
        .iter()
        .find(|(_, code, _)| *code == key.0)
        .map(|(_, _, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters() {
        assert_eq!(translate('a'), Some(KeyCode(0x00)));
        assert_eq!(translate('s'), Some(KeyCode(0x01)));
        assert_eq!(translate('z'), Some(KeyCode(0x06)));
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(translate('S'), translate('s'));
    }

    #[test]
    fn test_digits_and_punctuation() {
        assert_eq!(translate('0'), Some(KeyCode(0x1D)));
        assert_eq!(translate('5'), Some(KeyCode(0x17)));
        assert_eq!(translate('/'), Some(KeyCode(0x2C)));
        assert_eq!(translate(' '), Some(KeyCode(0x31)));
    }

    #[test]
    fn test_unmapped_character() {
        assert_eq!(translate('é'), None);
        assert_eq!(translate('!'), None);
    }

    #[test]
    fn test_table_has_no_duplicates() {
        for (i, (c, code, _)) in KEY_TABLE.iter().enumerate() {
            for (other_c, other_code, _) in &KEY_TABLE[i + 1..] {
                assert_ne!(c, other_c);
                assert_ne!(code, other_code);
            }
        }
    }

    #[test]
    fn test_reverse_lookup() {
        assert_eq!(character(KeyCode(0x01)), Some('s'));
        assert_eq!(character(KeyCode(0x24)), None); // return key
    }

    #[test]
    fn test_accelerator_key() {
        assert_eq!(accelerator_key(KeyCode(0x01)), Some("KeyS"));
        assert_eq!(accelerator_key(KeyCode(0x1B)), Some("Minus"));
        assert_eq!(accelerator_key(KeyCode(0x7A)), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(KeyCode(0x2C).to_string(), "0x2C");
    }
}
