//! Record keys.

use std::fmt;

/// A comparable record key.
///
/// Keys have a total order across kinds: every integer sorts before every
/// string, strings before byte strings, and byte strings before arrays.
/// Arrays compare element by element. The variant order below is the sort
/// order, so the derived `Ord` is the key order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Signed integer key.
    Int(i64),
    /// UTF-8 string key.
    Text(String),
    /// Binary key.
    Bytes(Vec<u8>),
    /// Compound key.
    Array(Vec<Key>),
}

impl Key {
    /// The smallest possible key.
    pub const MIN: Key = Key::Int(i64::MIN);
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => {
                f.write_str("0x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for Key {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Self::Text(s.clone())
    }
}

impl From<&[u8]> for Key {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for Key {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<Key>> for Key {
    fn from(items: Vec<Key>) -> Self {
        Self::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_across_kinds() {
        let mut keys = vec![
            Key::Array(vec![Key::Int(0)]),
            Key::Bytes(vec![0]),
            Key::Text("a".into()),
            Key::Int(7),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                Key::Int(7),
                Key::Text("a".into()),
                Key::Bytes(vec![0]),
                Key::Array(vec![Key::Int(0)]),
            ]
        );
    }

    #[test]
    fn arrays_compare_elementwise() {
        let a = Key::from(vec![Key::Int(1), Key::from("b")]);
        let b = Key::from(vec![Key::Int(1), Key::from("c")]);
        let short = Key::from(vec![Key::Int(1)]);
        assert!(a < b);
        assert!(short < a);
    }

    #[test]
    fn min_is_smallest() {
        assert!(Key::MIN <= Key::Int(i64::MIN));
        assert!(Key::MIN < Key::from(""));
    }

    #[test]
    fn display() {
        assert_eq!(Key::from(42).to_string(), "42");
        assert_eq!(Key::from("k").to_string(), "\"k\"");
        assert_eq!(Key::from(vec![0xabu8, 0x01]).to_string(), "0xab01");
        assert_eq!(
            Key::from(vec![Key::from(1), Key::from("x")]).to_string(),
            "[1, \"x\"]"
        );
    }
}
