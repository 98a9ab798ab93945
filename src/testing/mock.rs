use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use alloy::primitives::{Address, I256, U256};
use dashmap::DashMap;

use crate::{
    error::ExchangeError,
    exchange::{PerpExchange, PriceOracle},
    num::{self, Converter, FeeRatio, WAD},
    types::{MarketStatus, PositionChanged, RoundData, TradeRequest},
};

/// In-memory price oracle.
///
/// Clones share feeds, index prices and the clock, so a test can keep a
/// handle and move prices or time after the oracle is handed to the wrapper.
#[derive(Clone, Debug, Default)]
pub struct MockOracle {
    rounds: Arc<DashMap<Address, RoundData>>,
    index_prices: Arc<DashMap<Address, U256>>,
    clock: Arc<AtomicU64>,
}

impl MockOracle {
    pub fn new(now: u64) -> Self {
        let oracle = Self::default();
        oracle.set_time(now);
        oracle
    }

    pub fn now(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }

    pub fn set_time(&self, now: u64) {
        self.clock.store(now, Ordering::Relaxed);
    }

    pub fn advance(&self, seconds: u64) {
        self.clock.fetch_add(seconds, Ordering::Relaxed);
    }

    /// Publishes a whole-unit `price` with `decimals` of precision, updated now.
    pub fn set_price(&self, feed: Address, price: i64, decimals: u8) {
        let unit = I256::try_from(10u64.pow(decimals as u32)).unwrap();
        self.set_answer(feed, I256::try_from(price).unwrap() * unit, decimals);
    }

    /// Publishes a raw feed answer, updated now.
    pub fn set_answer(&self, feed: Address, answer: I256, decimals: u8) {
        let round_id = self.rounds.get(&feed).map(|r| r.round_id + 1).unwrap_or(1);
        self.rounds.insert(
            feed,
            RoundData {
                feed,
                round_id,
                answer,
                decimals,
                updated_at: self.now(),
            },
        );
    }

    /// Sets the index price of `market`, canonical fixed point.
    pub fn set_index_price(&self, market: Address, price: U256) {
        self.index_prices.insert(market, price);
    }
}

impl PriceOracle for MockOracle {
    fn latest_round_data(&self, feed: Address) -> Result<RoundData, ExchangeError> {
        self.rounds
            .get(&feed)
            .map(|r| *r)
            .ok_or(ExchangeError::NoPrice(feed))
    }

    fn index_price(&self, market: Address, _twap_interval: u32) -> Result<U256, ExchangeError> {
        self.index_prices
            .get(&market)
            .map(|p| *p)
            .ok_or(ExchangeError::NoPrice(market))
    }
}

#[derive(Clone, Copy, Debug)]
struct MockMarket {
    fee_ppm: u32,
    status: MarketStatus,
    settlement_price: U256,
}

#[derive(Clone, Copy, Debug)]
struct MockToken {
    decimals: u8,
    price_feed: Option<Address>,
}

#[derive(Clone, Copy, Debug, Default)]
struct MockPosition {
    size: I256,
    open_notional: I256,
}

/// In-memory perpetual exchange filling every trade at the oracle index
/// price with the market's ppm fee charged in quote.
///
/// Trading PnL and fees are kept as owed realized PnL per trader, separate
/// from the token balances of the margin vault.
#[derive(Clone, Debug)]
pub struct MockExchange {
    oracle: MockOracle,
    markets: HashMap<Address, MockMarket>,
    tokens: HashMap<Address, MockToken>,
    vault: HashMap<(Address, Address), U256>,
    positions: HashMap<(Address, Address), MockPosition>,
    owed_realized_pnl: HashMap<Address, I256>,
    pending_funding: HashMap<(Address, Address), I256>,
    fail_next: Option<ExchangeError>,
}

impl MockExchange {
    pub fn new(oracle: MockOracle) -> Self {
        Self {
            oracle,
            markets: HashMap::new(),
            tokens: HashMap::new(),
            vault: HashMap::new(),
            positions: HashMap::new(),
            owed_realized_pnl: HashMap::new(),
            pending_funding: HashMap::new(),
            fail_next: None,
        }
    }

    pub fn add_market(&mut self, market: Address, fee_ppm: u32) {
        self.markets.insert(
            market,
            MockMarket {
                fee_ppm,
                status: MarketStatus::Open,
                settlement_price: U256::ZERO,
            },
        );
    }

    /// Accepts `token` into the vault; `price_feed` values it in account
    /// value, tokens without a feed count one to one.
    pub fn add_token(&mut self, token: Address, decimals: u8, price_feed: Option<Address>) {
        self.tokens.insert(token, MockToken { decimals, price_feed });
    }

    pub fn set_fee_ratio(&mut self, market: Address, fee_ppm: u32) {
        if let Some(m) = self.markets.get_mut(&market) {
            m.fee_ppm = fee_ppm;
        }
    }

    pub fn pause_market(&mut self, market: Address) {
        if let Some(m) = self.markets.get_mut(&market) {
            m.status = MarketStatus::Paused;
        }
    }

    /// Closes `market` for good; positions are quit at `price`.
    pub fn close_market(&mut self, market: Address, price: U256) {
        if let Some(m) = self.markets.get_mut(&market) {
            m.status = MarketStatus::Closed;
            m.settlement_price = price;
        }
    }

    /// Accrues one funding period: every position in `market` owes
    /// `size * rate`. A positive rate makes longs pay shorts.
    pub fn accrue_funding(&mut self, market: Address, rate: I256) {
        let wad = I256::try_from(WAD).unwrap();
        for (&(trader, m), position) in &self.positions {
            if m != market {
                continue;
            }
            let payment = position.size * rate / wad;
            *self.pending_funding.entry((trader, market)).or_default() += payment;
        }
    }

    /// Makes the next `open_position` or `quit_market` call fail with
    /// `error`.
    pub fn fail_next_trade(&mut self, error: ExchangeError) {
        self.fail_next = Some(error);
    }

    pub fn owed_realized_pnl(&self, trader: Address) -> I256 {
        self.owed_realized_pnl.get(&trader).copied().unwrap_or_default()
    }

    pub fn open_notional(&self, trader: Address, market: Address) -> I256 {
        self.positions
            .get(&(trader, market))
            .map(|p| p.open_notional)
            .unwrap_or_default()
    }

    fn market(&self, market: Address) -> Result<&MockMarket, ExchangeError> {
        self.markets
            .get(&market)
            .ok_or(ExchangeError::UnknownMarket(market))
    }

    fn add_owed(&mut self, trader: Address, amount: I256) {
        *self.owed_realized_pnl.entry(trader).or_default() += amount;
    }

    fn token_value(&self, token: Address, amount: U256) -> Result<I256, ExchangeError> {
        let info = self
            .tokens
            .get(&token)
            .ok_or_else(|| ExchangeError::Reverted(format!("token {token} not supported")))?;
        let canonical = math(Converter::new(info.decimals).to_canonical(amount))?;
        let value = match info.price_feed {
            Some(feed) => {
                let round = self.oracle.latest_round_data(feed)?;
                let price = math(Converter::new(round.decimals).to_canonical(round.answer.unsigned_abs()))?;
                math(num::mul_div(canonical, price, WAD))?
            }
            None => canonical,
        };
        math(num::signed(value, false))
    }

    /// Fills `request` at `price`: returns base and quote moved, both
    /// unsigned, and the fee, all before fee except for the fee itself.
    fn fill(
        request: &TradeRequest,
        price: U256,
        fee: FeeRatio,
    ) -> Result<Fill, ExchangeError> {
        let amount = request.amount;
        let fill = match (request.is_base_to_quote, request.is_exact_input) {
            (true, true) => {
                let gross = math(num::mul_div(amount, price, WAD))?;
                let net = math(fee.net_of_fee(gross))?;
                Fill {
                    base: amount,
                    notional: gross,
                    quote: net,
                    fee: gross - net,
                    opposite: net,
                }
            }
            (true, false) => {
                let gross = math(fee.gross_of_fee(amount))?;
                let base = math(num::mul_div_up(gross, WAD, price))?;
                Fill {
                    base,
                    notional: gross,
                    quote: amount,
                    fee: gross - amount,
                    opposite: base,
                }
            }
            (false, true) => {
                let net = math(fee.net_of_fee(amount))?;
                let base = math(num::mul_div(net, WAD, price))?;
                Fill {
                    base,
                    notional: net,
                    quote: amount,
                    fee: amount - net,
                    opposite: base,
                }
            }
            (false, false) => {
                let net = math(num::mul_div_up(amount, price, WAD))?;
                let gross = math(fee.gross_of_fee(net))?;
                Fill {
                    base: amount,
                    notional: net,
                    quote: gross,
                    fee: gross - net,
                    opposite: gross,
                }
            }
        };

        let bound = request.opposite_amount_bound;
        if !bound.is_zero() {
            let violated = if request.is_exact_input {
                fill.opposite < bound
            } else {
                fill.opposite > bound
            };
            if violated {
                return Err(ExchangeError::SlippageExceeded {
                    bound,
                    actual: fill.opposite,
                });
            }
        }
        Ok(fill)
    }
}

#[derive(Clone, Copy, Debug)]
struct Fill {
    base: U256,
    notional: U256,
    quote: U256,
    fee: U256,
    opposite: U256,
}

impl PerpExchange for MockExchange {
    fn open_position(
        &mut self,
        trader: Address,
        request: &TradeRequest,
    ) -> Result<PositionChanged, ExchangeError> {
        if let Some(e) = self.fail_next.take() {
            return Err(e);
        }
        let market = *self.market(request.market)?;
        if market.status != MarketStatus::Open {
            return Err(ExchangeError::MarketUnavailable {
                market: request.market,
                status: market.status,
            });
        }
        let now = self.oracle.now();
        if now > request.deadline {
            return Err(ExchangeError::DeadlineExpired {
                deadline: request.deadline,
                now,
            });
        }
        if request.amount.is_zero() {
            return Err(ExchangeError::Reverted("zero amount".into()));
        }

        let price = self.oracle.index_price(request.market, 0)?;
        let fee = math(FeeRatio::new(market.fee_ppm))?;
        let fill = Self::fill(request, price, fee)?;

        let selling = request.is_base_to_quote;
        let base = math(num::signed(fill.base, selling))?;
        let quote = math(num::signed(fill.quote, !selling))?;
        let notional = math(num::signed(fill.notional, !selling))?;
        let fee_paid = math(num::signed(fill.fee, true))?;

        let position = self.positions.entry((trader, request.market)).or_default();
        position.size += base;
        position.open_notional += notional;
        let closed_out = position.size.is_zero().then_some(position.open_notional);
        if closed_out.is_some() {
            self.positions.remove(&(trader, request.market));
        }
        self.add_owed(trader, fee_paid + closed_out.unwrap_or_default());

        Ok(PositionChanged {
            trader,
            market: request.market,
            base,
            quote,
            fee: fill.fee,
        })
    }

    fn total_position_size(&self, trader: Address, market: Address) -> Result<I256, ExchangeError> {
        self.market(market)?;
        Ok(self
            .positions
            .get(&(trader, market))
            .map(|p| p.size)
            .unwrap_or_default())
    }

    fn account_value(&self, trader: Address) -> Result<I256, ExchangeError> {
        let mut value = self.owed_realized_pnl(trader);
        for (&(owner, token), &amount) in &self.vault {
            if owner == trader {
                value += self.token_value(token, amount)?;
            }
        }
        let wad = I256::try_from(WAD).unwrap();
        for (&(owner, market), position) in &self.positions {
            if owner == trader {
                let price = math(num::signed(self.oracle.index_price(market, 0)?, false))?;
                value += position.open_notional + position.size * price / wad;
            }
        }
        for (&(owner, _), &pending) in &self.pending_funding {
            if owner == trader {
                value -= pending;
            }
        }
        Ok(value)
    }

    fn fee_ratio(&self, market: Address) -> Result<u32, ExchangeError> {
        Ok(self.market(market)?.fee_ppm)
    }

    fn deposit(&mut self, trader: Address, token: Address, amount: U256) -> Result<(), ExchangeError> {
        if !self.tokens.contains_key(&token) {
            return Err(ExchangeError::Reverted(format!("token {token} not supported")));
        }
        *self.vault.entry((trader, token)).or_default() += amount;
        Ok(())
    }

    fn withdraw(&mut self, trader: Address, token: Address, amount: U256) -> Result<(), ExchangeError> {
        let available = self.vault.get(&(trader, token)).copied().unwrap_or_default();
        if amount > available {
            return Err(ExchangeError::InsufficientVaultBalance {
                token,
                requested: amount,
                available,
            });
        }
        self.vault.insert((trader, token), available - amount);
        Ok(())
    }

    fn balance_by_token(&self, trader: Address, token: Address) -> Result<U256, ExchangeError> {
        Ok(self.vault.get(&(trader, token)).copied().unwrap_or_default())
    }

    fn pending_funding_payment(&self, trader: Address, market: Address) -> Result<I256, ExchangeError> {
        self.market(market)?;
        Ok(self
            .pending_funding
            .get(&(trader, market))
            .copied()
            .unwrap_or_default())
    }

    fn settle_all_funding(&mut self, trader: Address) -> Result<(), ExchangeError> {
        let settled: Vec<_> = self
            .pending_funding
            .keys()
            .filter(|(owner, _)| *owner == trader)
            .copied()
            .collect();
        for key in settled {
            if let Some(pending) = self.pending_funding.remove(&key) {
                self.add_owed(trader, -pending);
            }
        }
        Ok(())
    }

    fn market_status(&self, market: Address) -> Result<MarketStatus, ExchangeError> {
        Ok(self.market(market)?.status)
    }

    fn quit_market(&mut self, trader: Address, market: Address) -> Result<PositionChanged, ExchangeError> {
        if let Some(e) = self.fail_next.take() {
            return Err(e);
        }
        let info = *self.market(market)?;
        if info.status != MarketStatus::Closed {
            return Err(ExchangeError::MarketUnavailable {
                market,
                status: info.status,
            });
        }
        let position = self
            .positions
            .remove(&(trader, market))
            .unwrap_or_default();
        let wad = I256::try_from(WAD).unwrap();
        let price = math(num::signed(info.settlement_price, false))?;
        let value = position.size * price / wad;
        self.add_owed(trader, position.open_notional + value);

        Ok(PositionChanged {
            trader,
            market,
            base: -position.size,
            quote: value,
            fee: U256::ZERO,
        })
    }

    fn block_timestamp(&self) -> u64 {
        self.oracle.now()
    }
}

fn math<T>(res: crate::error::Result<T>) -> Result<T, ExchangeError> {
    res.map_err(|e| ExchangeError::Reverted(e.to_string()))
}
