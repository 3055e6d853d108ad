//! Price feed adapter and fixed-point USD arithmetic.
//!
//! USD values are carried as integers with [`USD_DECIMALS`] decimals. A feed
//! reports `rate` USD per whole native token with `decimals` decimals; the
//! conversion of a native amount never leaves integer arithmetic.

use std::{fmt, str::FromStr};

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

use crate::{Address, Amount, FundMeError, NATIVE_DECIMALS};

pub const USD_DECIMALS: u32 = 18;

/// Feeds reporting more decimals than this are treated as broken.
pub const MAX_FEED_DECIMALS: u8 = 36;

// The native scale cancels out of the conversion only while both scales agree.
const _: () = assert!(USD_DECIMALS == NATIVE_DECIMALS);

pub const USD_SCALE: u128 = 1_000_000_000_000_000_000;

/// USD value with 18 decimals of fixed-point precision.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct UsdAmount(u128);

impl UsdAmount {
    pub const ZERO: UsdAmount = UsdAmount(0);

    /// Whole dollars.
    pub fn from_dollars(dollars: u128) -> Option<Self> {
        dollars.checked_mul(USD_SCALE).map(Self)
    }

    /// Raw fixed-point value (1 USD = 10^18).
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for UsdAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / USD_SCALE;
        let frac = self.0 % USD_SCALE;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:018}");
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl fmt::Debug for UsdAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UsdAmount({self})")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsdParseError {
    #[error("empty USD amount")]
    Empty,
    #[error("invalid digit in USD amount {0:?}")]
    InvalidDigit(String),
    #[error("USD amounts carry at most {} decimals", USD_DECIMALS)]
    TooPrecise,
    #[error("USD amount out of range")]
    Overflow,
}

impl FromStr for UsdAmount {
    type Err = UsdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(UsdParseError::Empty);
        }
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(UsdParseError::Empty);
        }
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(whole) || !all_digits(frac) {
            return Err(UsdParseError::InvalidDigit(s.to_string()));
        }
        if frac.len() > USD_DECIMALS as usize {
            return Err(UsdParseError::TooPrecise);
        }
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| UsdParseError::Overflow)?
        };
        let frac: u128 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<width$}", width = USD_DECIMALS as usize);
            padded.parse().map_err(|_| UsdParseError::Overflow)?
        };
        whole
            .checked_mul(USD_SCALE)
            .and_then(|v| v.checked_add(frac))
            .map(Self)
            .ok_or(UsdParseError::Overflow)
    }
}

impl Serialize for UsdAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UsdAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(D::Error::custom)
    }
}

/// One answer from a price feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateReading {
    /// USD per whole native token, scaled by `10^decimals`.
    pub rate: i128,
    pub decimals: u8,
    pub round_id: u64,
}

impl RateReading {
    fn checked_rate(&self) -> Result<u128, FundMeError> {
        if self.round_id == 0 {
            return Err(FundMeError::OracleUnavailable("feed has no completed round".into()));
        }
        if self.decimals > MAX_FEED_DECIMALS {
            return Err(FundMeError::OracleUnavailable(format!(
                "feed reports {} decimals",
                self.decimals
            )));
        }
        match u128::try_from(self.rate) {
            Ok(rate) if rate > 0 => Ok(rate),
            _ => Err(FundMeError::OracleUnavailable(format!(
                "non-positive answer {}",
                self.rate
            ))),
        }
    }

    /// USD value of `amount` native units, rounded down.
    pub fn convert_to_usd(&self, amount: Amount) -> Result<UsdAmount, FundMeError> {
        let rate = self.checked_rate()?;
        let scaled = amount
            .checked_mul(rate)
            .ok_or(FundMeError::ArithmeticOverflow("usd conversion"))?;
        Ok(UsdAmount(scaled / 10u128.pow(self.decimals as u32)))
    }

    /// Smallest native amount whose USD value reaches `usd`.
    pub fn native_for_usd(&self, usd: UsdAmount) -> Result<Amount, FundMeError> {
        let rate = self.checked_rate()?;
        let scaled = usd
            .0
            .checked_mul(10u128.pow(self.decimals as u32))
            .ok_or(FundMeError::ArithmeticOverflow("native conversion"))?;
        Ok(scaled.div_ceil(rate))
    }
}

/// Source of the native → USD rate.
///
/// Queried synchronously on every contribution; implementations must not
/// hand back a cached answer from an earlier call on their own.
pub trait PriceOracle {
    /// Handle under which the feed is deployed.
    fn address(&self) -> Address;

    fn latest_rate(&self) -> Result<RateReading, FundMeError>;
}

/// Settable feed for local networks and tests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockAggregator {
    address: Address,
    decimals: u8,
    answer: i128,
    round_id: u64,
}

impl MockAggregator {
    pub fn new(address: Address, decimals: u8, initial_answer: i128) -> Self {
        let mut feed = Self {
            address,
            decimals,
            answer: 0,
            round_id: 0,
        };
        feed.update_answer(initial_answer);
        feed
    }

    /// Publish a new answer as the next round.
    pub fn update_answer(&mut self, answer: i128) {
        self.answer = answer;
        self.round_id += 1;
    }

    pub fn answer(&self) -> i128 {
        self.answer
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn round_id(&self) -> u64 {
        self.round_id
    }
}

impl PriceOracle for MockAggregator {
    fn address(&self) -> Address {
        self.address
    }

    fn latest_rate(&self) -> Result<RateReading, FundMeError> {
        Ok(RateReading {
            rate: self.answer,
            decimals: self.decimals,
            round_id: self.round_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NATIVE_UNIT;

    fn reading(rate: i128, decimals: u8) -> RateReading {
        RateReading {
            rate,
            decimals,
            round_id: 1,
        }
    }

    #[test]
    fn usd_amount_parses_and_renders() {
        let fifty: UsdAmount = "50".parse().unwrap();
        assert_eq!(fifty, UsdAmount::from_dollars(50).unwrap());
        assert_eq!(fifty.to_string(), "50");

        let half: UsdAmount = "12.5".parse().unwrap();
        assert_eq!(half.raw(), 12_500_000_000_000_000_000);
        assert_eq!(half.to_string(), "12.5");

        let cents: UsdAmount = ".05".parse().unwrap();
        assert_eq!(cents.to_string(), "0.05");
    }

    #[test]
    fn usd_amount_rejects_garbage() {
        assert_eq!("".parse::<UsdAmount>(), Err(UsdParseError::Empty));
        assert_eq!(".".parse::<UsdAmount>(), Err(UsdParseError::Empty));
        assert!(matches!(
            "-3".parse::<UsdAmount>(),
            Err(UsdParseError::InvalidDigit(_))
        ));
        assert_eq!(
            "0.0000000000000000001".parse::<UsdAmount>(),
            Err(UsdParseError::TooPrecise)
        );
        assert_eq!(
            "999999999999999999999999".parse::<UsdAmount>(),
            Err(UsdParseError::Overflow)
        );
    }

    #[test]
    fn converts_one_token_at_2000_usd() {
        let usd = reading(2_000_00000000, 8)
            .convert_to_usd(NATIVE_UNIT)
            .unwrap();
        assert_eq!(usd, UsdAmount::from_dollars(2_000).unwrap());
    }

    #[test]
    fn conversion_matches_threshold_exactly() {
        // 50 USD at 2000 USD/token is exactly 0.025 tokens
        let feed = reading(2_000_00000000, 8);
        let minimum = UsdAmount::from_dollars(50).unwrap();
        let exact = NATIVE_UNIT / 40;
        assert_eq!(feed.convert_to_usd(exact).unwrap(), minimum);
        assert!(feed.convert_to_usd(exact - 1).unwrap() < minimum);
        assert_eq!(feed.native_for_usd(minimum).unwrap(), exact);
    }

    #[test]
    fn native_for_usd_rounds_up() {
        // 1 USD at 3 USD/token needs 1/3 token, rounded up to the next unit
        let feed = reading(3, 0);
        let needed = feed
            .native_for_usd(UsdAmount::from_dollars(1).unwrap())
            .unwrap();
        assert_eq!(needed, NATIVE_UNIT / 3 + 1);
        assert!(feed.convert_to_usd(needed).unwrap() >= UsdAmount::from_dollars(1).unwrap());
        assert!(feed.convert_to_usd(needed - 1).unwrap() < UsdAmount::from_dollars(1).unwrap());
    }

    #[test]
    fn invalid_answers_make_the_oracle_unavailable() {
        for bad in [reading(0, 8), reading(-5, 8), reading(1, 40)] {
            assert!(matches!(
                bad.convert_to_usd(NATIVE_UNIT),
                Err(FundMeError::OracleUnavailable(_))
            ));
        }
        let unanswered = RateReading {
            rate: 1,
            decimals: 8,
            round_id: 0,
        };
        assert!(matches!(
            unanswered.convert_to_usd(1),
            Err(FundMeError::OracleUnavailable(_))
        ));
    }

    #[test]
    fn huge_amounts_overflow_instead_of_wrapping() {
        let err = reading(i128::MAX, 8).convert_to_usd(u128::MAX).unwrap_err();
        assert_eq!(err, FundMeError::ArithmeticOverflow("usd conversion"));
    }

    #[test]
    fn mock_aggregator_advances_rounds() {
        let mut feed = MockAggregator::new(Address::ZERO, 8, 2_000_00000000);
        assert_eq!(feed.round_id(), 1);
        feed.update_answer(3_000_00000000);
        let latest = feed.latest_rate().unwrap();
        assert_eq!(latest.rate, 3_000_00000000);
        assert_eq!(latest.round_id, 2);
    }
}
