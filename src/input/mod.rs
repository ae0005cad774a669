//! Keyboard and mouse normalization
//!
//! Both backends report keys in their own vocabulary: X11 hands out keysyms
//! looked up from the core keyboard mapping, Wayland hands out Linux evdev
//! codes. This module folds both into [`Key`], [`MouseButton`] and
//! [`Modifiers`], and produces the UTF-8 text carried by key events.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize, Serializer};

/// Normalized key identity, independent of layout state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Key {
    #[default]
    Unknown,
    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    Num0, Num1, Num2, Num3, Num4, Num5, Num6, Num7, Num8, Num9,
    Space,
    Enter,
    Escape,
    Backspace,
    Tab,
    Shift,
    Ctrl,
    Alt,
    Super,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
}

const LETTERS: [Key; 26] = [
    Key::A, Key::B, Key::C, Key::D, Key::E, Key::F, Key::G, Key::H, Key::I,
    Key::J, Key::K, Key::L, Key::M, Key::N, Key::O, Key::P, Key::Q, Key::R,
    Key::S, Key::T, Key::U, Key::V, Key::W, Key::X, Key::Y, Key::Z,
];

const DIGITS: [Key; 10] = [
    Key::Num0, Key::Num1, Key::Num2, Key::Num3, Key::Num4,
    Key::Num5, Key::Num6, Key::Num7, Key::Num8, Key::Num9,
];

const FUNCTION_KEYS: [Key; 12] = [
    Key::F1, Key::F2, Key::F3, Key::F4, Key::F5, Key::F6,
    Key::F7, Key::F8, Key::F9, Key::F10, Key::F11, Key::F12,
];

impl Key {
    /// Map a Linux input event code (as sent by `wl_keyboard.key`)
    ///
    /// See: /usr/include/linux/input-event-codes.h
    pub fn from_evdev(code: u32) -> Self {
        match code {
            1 => Key::Escape,                       // KEY_ESC
            2..=10 => DIGITS[(code - 1) as usize],  // KEY_1..KEY_9
            11 => Key::Num0,                        // KEY_0
            14 => Key::Backspace,                   // KEY_BACKSPACE
            15 => Key::Tab,                         // KEY_TAB
            16 => Key::Q,
            17 => Key::W,
            18 => Key::E,
            19 => Key::R,
            20 => Key::T,
            21 => Key::Y,
            22 => Key::U,
            23 => Key::I,
            24 => Key::O,
            25 => Key::P,
            28 | 96 => Key::Enter,                  // KEY_ENTER, KEY_KPENTER
            29 | 97 => Key::Ctrl,                   // KEY_LEFTCTRL, KEY_RIGHTCTRL
            30 => Key::A,
            31 => Key::S,
            32 => Key::D,
            33 => Key::F,
            34 => Key::G,
            35 => Key::H,
            36 => Key::J,
            37 => Key::K,
            38 => Key::L,
            42 | 54 => Key::Shift,                  // KEY_LEFTSHIFT, KEY_RIGHTSHIFT
            44 => Key::Z,
            45 => Key::X,
            46 => Key::C,
            47 => Key::V,
            48 => Key::B,
            49 => Key::N,
            50 => Key::M,
            56 | 100 => Key::Alt,                   // KEY_LEFTALT, KEY_RIGHTALT
            57 => Key::Space,                       // KEY_SPACE
            59..=68 => FUNCTION_KEYS[(code - 59) as usize], // KEY_F1..KEY_F10
            87 => Key::F11,
            88 => Key::F12,
            102 => Key::Home,
            103 => Key::Up,
            104 => Key::PageUp,
            105 => Key::Left,
            106 => Key::Right,
            107 => Key::End,
            108 => Key::Down,
            109 => Key::PageDown,
            110 => Key::Insert,
            111 => Key::Delete,
            125 | 126 => Key::Super,                // KEY_LEFTMETA, KEY_RIGHTMETA
            _ => Key::Unknown,
        }
    }

    /// Map an X keysym (from the unshifted column of the keyboard mapping)
    pub fn from_keysym(keysym: u32) -> Self {
        match keysym {
            0x0061..=0x007a => LETTERS[(keysym - 0x0061) as usize], // XK_a..XK_z
            0x0041..=0x005a => LETTERS[(keysym - 0x0041) as usize], // XK_A..XK_Z
            0x0030..=0x0039 => DIGITS[(keysym - 0x0030) as usize],  // XK_0..XK_9
            0x0020 => Key::Space,
            0xff0d | 0xff8d => Key::Enter,          // XK_Return, XK_KP_Enter
            0xff1b => Key::Escape,
            0xff08 => Key::Backspace,
            0xff09 => Key::Tab,
            0xffe1 | 0xffe2 => Key::Shift,          // XK_Shift_L, XK_Shift_R
            0xffe3 | 0xffe4 => Key::Ctrl,           // XK_Control_L, XK_Control_R
            // XK_Meta_L, XK_Meta_R, XK_Alt_L, XK_Alt_R, XK_ISO_Level3_Shift
            0xffe7..=0xffea | 0xfe03 => Key::Alt,
            0xffeb | 0xffec => Key::Super,          // XK_Super_L, XK_Super_R
            0xff50 => Key::Home,
            0xff51 => Key::Left,
            0xff52 => Key::Up,
            0xff53 => Key::Right,
            0xff54 => Key::Down,
            0xff55 => Key::PageUp,
            0xff56 => Key::PageDown,
            0xff57 => Key::End,
            0xff63 => Key::Insert,
            0xffff => Key::Delete,
            0xffbe..=0xffc9 => FUNCTION_KEYS[(keysym - 0xffbe) as usize], // XK_F1..XK_F12
            _ => Key::Unknown,
        }
    }

    /// Human-readable key name
    pub fn name(self) -> &'static str {
        const LETTER_NAMES: [&str; 26] = [
            "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M",
            "N", "O", "P", "Q", "R", "S", "T", "U", "V", "W", "X", "Y", "Z",
        ];
        const DIGIT_NAMES: [&str; 10] = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];
        const FUNCTION_NAMES: [&str; 12] = [
            "F1", "F2", "F3", "F4", "F5", "F6", "F7", "F8", "F9", "F10", "F11", "F12",
        ];

        if let Some(i) = LETTERS.iter().position(|k| *k == self) {
            return LETTER_NAMES[i];
        }
        if let Some(i) = DIGITS.iter().position(|k| *k == self) {
            return DIGIT_NAMES[i];
        }
        if let Some(i) = FUNCTION_KEYS.iter().position(|k| *k == self) {
            return FUNCTION_NAMES[i];
        }

        match self {
            Key::Space => "Space",
            Key::Enter => "Enter",
            Key::Escape => "Escape",
            Key::Backspace => "Backspace",
            Key::Tab => "Tab",
            Key::Shift => "Shift",
            Key::Ctrl => "Ctrl",
            Key::Alt => "Alt",
            Key::Super => "Super",
            Key::Up => "Up",
            Key::Down => "Down",
            Key::Left => "Left",
            Key::Right => "Right",
            Key::Home => "Home",
            Key::End => "End",
            Key::PageUp => "PageUp",
            Key::PageDown => "PageDown",
            Key::Insert => "Insert",
            Key::Delete => "Delete",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    X1,
    X2,
}

impl MouseButton {
    /// Core protocol button number; 4-7 are wheel clicks and not buttons
    pub fn from_x11(button: u8) -> Option<Self> {
        match button {
            1 => Some(MouseButton::Left),
            2 => Some(MouseButton::Middle),
            3 => Some(MouseButton::Right),
            8 => Some(MouseButton::X1),
            9 => Some(MouseButton::X2),
            _ => None,
        }
    }

    /// Linux `BTN_*` code as sent by `wl_pointer.button`
    pub fn from_evdev(code: u32) -> Option<Self> {
        match code {
            0x110 => Some(MouseButton::Left),   // BTN_LEFT
            0x111 => Some(MouseButton::Right),  // BTN_RIGHT
            0x112 => Some(MouseButton::Middle), // BTN_MIDDLE
            0x113 => Some(MouseButton::X1),     // BTN_SIDE
            0x114 => Some(MouseButton::X2),     // BTN_EXTRA
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MouseButton::Left => "Left",
            MouseButton::Right => "Right",
            MouseButton::Middle => "Middle",
            MouseButton::X1 => "X1",
            MouseButton::X2 => "X2",
        }
    }
}

bitflags! {
    /// Held modifier keys
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Modifiers: u32 {
        const SHIFT = 1 << 0;
        const CTRL = 1 << 1;
        const ALT = 1 << 2;
        const SUPER = 1 << 3;
    }
}

impl Modifiers {
    /// Translate a core modifier mask
    ///
    /// X11 key/button state and `wl_keyboard.modifiers` depressed masks share
    /// the same bit layout: Shift=1, Control=4, Mod1=8, Mod4=64, Mod5=128.
    /// Mod5 is AltGr on most international layouts and counts as Alt.
    pub fn from_core_mask(mask: u32) -> Self {
        let mut modifiers = Modifiers::empty();
        if mask & 0x01 != 0 {
            modifiers |= Modifiers::SHIFT;
        }
        if mask & 0x04 != 0 {
            modifiers |= Modifiers::CTRL;
        }
        if mask & (0x08 | 0x80) != 0 {
            modifiers |= Modifiers::ALT;
        }
        if mask & 0x40 != 0 {
            modifiers |= Modifiers::SUPER;
        }
        modifiers
    }
}

impl fmt::Display for Modifiers {
    /// Formats as e.g. `Ctrl+Shift`; empty when no modifier is held
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Modifiers::CTRL, "Ctrl"),
            (Modifiers::SHIFT, "Shift"),
            (Modifiers::ALT, "Alt"),
            (Modifiers::SUPER, "Super"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str("+")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// UTF-8 text produced by a key press, stored inline so events stay `Copy`
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KeyText {
    len: u8,
    buf: [u8; KeyText::CAPACITY],
}

impl KeyText {
    pub const CAPACITY: usize = 32;

    /// Copy `text`, truncating at a character boundary if it is too long
    ///
    /// Returns `None` for empty input.
    pub fn new(text: &str) -> Option<Self> {
        let mut end = text.len().min(Self::CAPACITY);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            return None;
        }
        let mut buf = [0u8; Self::CAPACITY];
        buf[..end].copy_from_slice(&text.as_bytes()[..end]);
        Some(Self { len: end as u8, buf })
    }

    pub fn as_str(&self) -> &str {
        // Only ever filled from a &str cut at a char boundary
        std::str::from_utf8(&self.buf[..self.len as usize]).unwrap_or_default()
    }
}

impl fmt::Debug for KeyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for KeyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for KeyText {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Text for an X keysym, following the Latin-1 and Unicode keysym ranges
///
/// Editing keys produce the control characters an input method would
/// (`\r`, `\t`, `\x08`, `\x1b`); everything else without a printable form
/// yields `None`.
pub fn keysym_text(keysym: u32) -> Option<KeyText> {
    let ch = match keysym {
        0x0020..=0x007e | 0x00a0..=0x00ff => char::from_u32(keysym),
        0x0100_0000..=0x0110_ffff => char::from_u32(keysym - 0x0100_0000),
        0xff0d | 0xff8d => Some('\r'),
        0xff09 => Some('\t'),
        0xff08 => Some('\u{8}'),
        0xff1b => Some('\u{1b}'),
        _ => None,
    }?;
    let mut utf8 = [0u8; 4];
    KeyText::new(ch.encode_utf8(&mut utf8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evdev_and_keysym_agree_on_letters() {
        assert_eq!(Key::from_evdev(30), Key::A);
        assert_eq!(Key::from_keysym('a' as u32), Key::A);
        assert_eq!(Key::from_keysym('A' as u32), Key::A);
        assert_eq!(Key::from_evdev(44), Key::Z);
        assert_eq!(Key::from_keysym('z' as u32), Key::Z);
    }

    #[test]
    fn digit_row_maps_in_order() {
        assert_eq!(Key::from_evdev(2), Key::Num1);
        assert_eq!(Key::from_evdev(10), Key::Num9);
        assert_eq!(Key::from_evdev(11), Key::Num0);
        assert_eq!(Key::from_keysym('7' as u32), Key::Num7);
    }

    #[test]
    fn function_keys() {
        assert_eq!(Key::from_evdev(59), Key::F1);
        assert_eq!(Key::from_evdev(68), Key::F10);
        assert_eq!(Key::from_evdev(88), Key::F12);
        assert_eq!(Key::from_keysym(0xffc9), Key::F12);
        assert_eq!(Key::F7.name(), "F7");
    }

    #[test]
    fn unknown_codes_fall_through() {
        assert_eq!(Key::from_evdev(999), Key::Unknown);
        assert_eq!(Key::from_keysym(0xfe50), Key::Unknown);
        assert_eq!(Key::Unknown.name(), "Unknown");
    }

    #[test]
    fn modifiers_from_core_mask() {
        let mods = Modifiers::from_core_mask(0x01 | 0x04 | 0x80);
        assert_eq!(mods, Modifiers::SHIFT | Modifiers::CTRL | Modifiers::ALT);
        assert_eq!(Modifiers::from_core_mask(0x40), Modifiers::SUPER);
        // Caps lock (0x02) is not a modifier
        assert!(Modifiers::from_core_mask(0x02).is_empty());
    }

    #[test]
    fn modifiers_display_order() {
        let mods = Modifiers::SUPER | Modifiers::SHIFT | Modifiers::CTRL;
        assert_eq!(mods.to_string(), "Ctrl+Shift+Super");
        assert_eq!(Modifiers::empty().to_string(), "");
    }

    #[test]
    fn key_text_truncates_on_char_boundary() {
        let long = "é".repeat(20); // 40 bytes
        let text = KeyText::new(&long).unwrap();
        assert_eq!(text.as_str().len(), 32);
        assert!(text.as_str().chars().all(|c| c == 'é'));
        assert!(KeyText::new("").is_none());
    }

    #[test]
    fn keysym_text_ranges() {
        assert_eq!(keysym_text('q' as u32).unwrap().as_str(), "q");
        assert_eq!(keysym_text(0x00e9).unwrap().as_str(), "é");
        assert_eq!(keysym_text(0x0100_20ac).unwrap().as_str(), "€");
        assert_eq!(keysym_text(0xff0d).unwrap().as_str(), "\r");
        assert!(keysym_text(0xffe1).is_none());
    }

    #[test]
    fn mouse_buttons() {
        assert_eq!(MouseButton::from_x11(2), Some(MouseButton::Middle));
        assert_eq!(MouseButton::from_x11(4), None);
        assert_eq!(MouseButton::from_evdev(0x111), Some(MouseButton::Right));
        assert_eq!(MouseButton::X2.name(), "X2");
    }
}
