use serde::{Deserialize, Deserializer, Serialize};

/// One recompilable unit: the half-open byte range `[address, address + size)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionEntry {
    pub name: String,
    #[serde(deserialize_with = "de_u32")]
    pub address: u32,
    #[serde(deserialize_with = "de_u32")]
    pub size: u32,
}

impl FunctionEntry {
    pub fn new(name: impl Into<String>, address: u32, size: u32) -> Self {
        Self { name: name.into(), address, size }
    }

    /// Exclusive end address. Widened so entries touching the top of the
    /// address space do not wrap.
    pub fn end(&self) -> u64 {
        u64::from(self.address) + u64::from(self.size)
    }

    pub fn contains(&self, address: u32) -> bool {
        address >= self.address && u64::from(address) < self.end()
    }

    /// Address of the last instruction nominally inside this entry.
    pub fn last_instruction(&self) -> Option<u32> {
        self.size
            .checked_sub(crate::isa::INSTRUCTION_WIDTH)
            .and_then(|off| self.address.checked_add(off))
    }
}

/// Record shape as found on disk, before invalid sizes are filtered out.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawEntry {
    pub name: String,
    #[serde(deserialize_with = "de_u32")]
    pub address: u32,
    #[serde(deserialize_with = "de_i64")]
    pub size: i64,
}

impl RawEntry {
    /// `None` for non-positive or oversized sizes.
    pub fn into_entry(self) -> Option<FunctionEntry> {
        match u32::try_from(self.size) {
            Ok(size) if size > 0 => Some(FunctionEntry::new(self.name, self.address, size)),
            _ => {
                log::warn!(
                    "dropping entry {} at {:#x}: invalid size {}",
                    self.name,
                    self.address,
                    self.size
                );
                None
            }
        }
    }
}

/// Accept either an integer or a `"0x..."` / decimal string.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(i64),
    Text(String),
}

fn de_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => Ok(n),
        NumberOrText::Text(text) => {
            let text = text.trim();
            let (negative, digits) = match text.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, text),
            };
            let parsed = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
                Some(hex) => i64::from_str_radix(hex, 16),
                None => digits.parse::<i64>(),
            };
            let value =
                parsed.map_err(|e| D::Error::custom(format!("invalid number '{text}': {e}")))?;
            Ok(if negative { -value } else { value })
        }
    }
}

fn de_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = de_i64(deserializer)?;
    u32::try_from(value)
        .map_err(|_| D::Error::custom(format!("{value:#x} does not fit in 32 bits")))
}
