use ethers::types::{I256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// USD values and prices on GMX are fixed-point with 30 decimals.
pub const USD_DECIMALS: u32 = 30;
/// Leverage and PnL percentages are reported in basis points.
pub const PERCENT_DECIMALS: u32 = 4;
/// Native gas token (ETH on Arbitrum).
pub const NATIVE_DECIMALS: u32 = 18;

/// A signed fixed-point integer amount as delivered by the exchange.
///
/// Accepts decimal strings, `0x`-prefixed hex strings and plain JSON
/// integers, since the SDK, subsquid and oracle endpoints disagree on
/// how big integers are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AmountRepr", into = "String")]
pub struct RawAmount(pub I256);

#[derive(Deserialize)]
#[serde(untagged)]
enum AmountRepr {
    Text(String),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl RawAmount {
    pub fn zero() -> Self {
        RawAmount(I256::zero())
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            Some(hex) => U256::from_str_radix(hex, 16)
                .map(|abs| RawAmount(I256::from_raw(abs)))
                .map_err(|e| format!("invalid hex amount {text:?}: {e:?}")),
            None => I256::from_dec_str(text)
                .map(RawAmount)
                .map_err(|e| format!("invalid integer amount {text:?}: {e:?}")),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.0 == I256::zero()
    }

    /// Multiply by `10^places`. Used to lift GMX contract prices (scaled by
    /// `30 - token_decimals`) onto the plain USD scale. `None` if the result
    /// does not fit in 256 bits.
    pub fn shifted(&self, places: u32) -> Option<Self> {
        if self.is_zero() || places == 0 {
            return Some(*self);
        }
        let text = format!("{}{}", self.0, "0".repeat(places as usize));
        RawAmount::parse(&text).ok()
    }
}

impl TryFrom<AmountRepr> for RawAmount {
    type Error = String;

    fn try_from(repr: AmountRepr) -> Result<Self, Self::Error> {
        match repr {
            AmountRepr::Text(s) => RawAmount::parse(&s),
            AmountRepr::Signed(n) => RawAmount::parse(&n.to_string()),
            AmountRepr::Unsigned(n) => RawAmount::parse(&n.to_string()),
            AmountRepr::Float(f) if f.is_finite() => RawAmount::parse(&format!("{:.0}", f.trunc())),
            AmountRepr::Float(f) => Err(format!("non-finite amount {f}")),
        }
    }
}

impl From<RawAmount> for String {
    fn from(amount: RawAmount) -> Self {
        amount.0.to_string()
    }
}

impl fmt::Display for RawAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `raw / 10^decimals` as f64.
///
/// The division is done on the decimal text so the only precision loss is
/// the final rounding into a double.
pub fn normalize(raw: I256, decimals: u32) -> f64 {
    let text = raw.to_string();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let places = decimals as usize;

    let scaled = if places == 0 {
        format!("{sign}{digits}")
    } else if digits.len() > places {
        let (whole, frac) = digits.split_at(digits.len() - places);
        format!("{sign}{whole}.{frac}")
    } else {
        format!("{sign}0.{}{digits}", "0".repeat(places - digits.len()))
    };

    scaled.parse::<f64>().unwrap_or(0.0)
}

/// Absent amounts normalize to zero.
pub fn normalize_opt(raw: Option<&RawAmount>, decimals: u32) -> f64 {
    raw.map(|r| normalize(r.0, decimals)).unwrap_or(0.0)
}
