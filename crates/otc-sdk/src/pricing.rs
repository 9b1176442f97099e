use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::amount::{AmountError, Price};
use crate::asset::AssetId;
use crate::error::{Error, Result};

/// A market the dealer makes: `mid_price` is units of `quote` per unit of `base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Market {
    pub base: AssetId,
    pub quote: AssetId,
    pub mid_price: Price,
    /// Fractional spread applied on either side of mid, in `[0, 1)`.
    pub spread: Decimal,
}

/// Which side of its book the dealer is quoting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteSide {
    /// Client sells base: the dealer buys it at `mid * (1 - spread)`.
    Bid,
    /// Client sells quote to get base: the dealer sells base at `mid * (1 + spread)`.
    Ask,
}

/// Result of a pair lookup: the side and the exact rate in units of the
/// client's buy asset per unit of its sell asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairQuote {
    pub side: QuoteSide,
    pub rate: Decimal,
}

/// The set of markets a dealer trades, looked up by `(asset_sell, asset_buy)`.
#[derive(Debug, Clone, Default)]
pub struct PricingPolicy {
    markets: HashMap<(AssetId, AssetId), Market>,
}

impl PricingPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_market(mut self, market: Market) -> Result<Self> {
        self.add_market(market)?;
        Ok(self)
    }

    /// Register or replace a market.
    pub fn add_market(&mut self, market: Market) -> Result<()> {
        if market.base == market.quote {
            return Err(Error::InvalidQuote(format!(
                "market base and quote are both {}",
                market.base
            )));
        }
        if market.mid_price.as_decimal().is_zero() {
            return Err(Error::InvalidQuote("mid price must be positive".into()));
        }
        if market.spread.is_sign_negative() || market.spread >= Decimal::ONE {
            return Err(Error::InvalidQuote(format!(
                "spread {} outside [0, 1)",
                market.spread
            )));
        }
        self.markets.insert((market.base, market.quote), market);
        Ok(())
    }

    /// Update the mid price of an existing market. Returns false if unknown.
    pub fn set_mid_price(&mut self, base: &AssetId, quote: &AssetId, mid_price: Price) -> bool {
        match self.markets.get_mut(&(*base, *quote)) {
            Some(market) => {
                market.mid_price = mid_price;
                true
            }
            None => false,
        }
    }

    pub fn trades(&self, asset_sell: &AssetId, asset_buy: &AssetId) -> bool {
        self.markets.contains_key(&(*asset_sell, *asset_buy))
            || self.markets.contains_key(&(*asset_buy, *asset_sell))
    }

    /// Price a client selling `asset_sell` for `asset_buy`.
    ///
    /// `None` when the dealer does not trade the pair.
    pub fn lookup(&self, asset_sell: &AssetId, asset_buy: &AssetId) -> Option<Result<PairQuote>> {
        if let Some(market) = self.markets.get(&(*asset_sell, *asset_buy)) {
            return Some(bid_rate(market).map(|rate| PairQuote {
                side: QuoteSide::Bid,
                rate,
            }));
        }
        self.markets.get(&(*asset_buy, *asset_sell)).map(|market| {
            ask_rate(market).map(|rate| PairQuote {
                side: QuoteSide::Ask,
                rate,
            })
        })
    }
}

/// quote per base: `mid * (1 - spread)`
fn bid_rate(market: &Market) -> Result<Decimal> {
    let factor = Decimal::ONE - market.spread;
    Ok(market
        .mid_price
        .as_decimal()
        .checked_mul(factor)
        .ok_or(AmountError::Overflow)?)
}

/// base per quote: `1 / (mid * (1 + spread))`
fn ask_rate(market: &Market) -> Result<Decimal> {
    let factor = Decimal::ONE + market.spread;
    let ask = market
        .mid_price
        .as_decimal()
        .checked_mul(factor)
        .ok_or(AmountError::Overflow)?;
    Ok(Decimal::ONE
        .checked_div(ask)
        .ok_or(AmountError::DivisionByZero)?)
}
