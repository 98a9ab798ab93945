use std::collections::HashMap;

use alloy::primitives::{Address, I256, U256};
use tracing::{debug, error, info, warn};

use super::*;
use crate::{
    error::{LemmaError, Result},
    exchange::{PerpExchange, PriceOracle},
    num::{Converter, FeeRatio},
    sizing::{CollateralValuator, PositionSizer, Sizing},
    types::{
        AssetRegistry, CollateralAsset, LemmaState, MarketStatus, PositionChanged,
        RebalanceParams, TradeRequest,
    },
};

/// Live view of the wrapper's position at the exchange.
#[derive(Clone, Copy, derive_more::Debug, PartialEq, Eq)]
pub struct PositionSnapshot {
    #[debug("{}", Converter::canonical().from_signed::<4>(*size))]
    pub size: I256,
    /// Collateral token balance in the margin vault, native decimals.
    pub collateral: U256,
    /// Account value at the exchange including unrealized PnL, canonical
    /// quote.
    #[debug("{}", Converter::canonical().from_signed::<4>(*account_value))]
    pub account_value: I256,
    pub state: LemmaState,
}

/// Result of a collateral-releasing close.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CloseOutcome {
    /// Exchange fill, absent when paid out of a settled pool.
    pub fill: Option<PositionChanged>,
    /// Collateral released to the caller, native decimals.
    pub collateral: U256,
}

/// Collateral withdrawn from the exchange by an emergency settlement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Settlement {
    collateral: U256,
    position: U256,
}

/// Basis-trading wrapper holding the exchange position that backs one
/// collateral asset of the synthetic dollar.
///
/// Every operation either completes or returns an error with the wrapper
/// and the exchange left as they were before the call. Pending funding is
/// settled only once a trade has gone through. Reads always query the
/// exchange; nothing but the funding ledger and custody is cached.
#[derive(derive_more::Debug)]
pub struct PerpLemma<E, O> {
    config: LemmaConfig,
    registry: AssetRegistry,
    #[debug(skip)]
    exchange: E,
    #[debug(skip)]
    oracle: O,
    custody: HashMap<Address, U256>,
    settlement_balance: U256,
    funding: FundingLedger,
    settlement: Option<Settlement>,
}

impl<E: PerpExchange, O: PriceOracle> PerpLemma<E, O> {
    pub fn new(config: LemmaConfig, registry: AssetRegistry, exchange: E, oracle: O) -> Result<Self> {
        registry.get(config.collateral())?;
        Ok(Self {
            config,
            registry,
            exchange,
            oracle,
            custody: HashMap::new(),
            settlement_balance: U256::ZERO,
            funding: FundingLedger::new(),
            settlement: None,
        })
    }

    pub fn config(&self) -> &LemmaConfig {
        &self.config
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    pub fn exchange_mut(&mut self) -> &mut E {
        &mut self.exchange
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Collateral asset backed by this wrapper.
    pub fn asset(&self) -> Result<&CollateralAsset> {
        self.registry.get(self.config.collateral())
    }

    /// Settlement token deposited at the exchange through
    /// [`Self::deposit_settlement_token`], native decimals.
    pub fn settlement_balance(&self) -> U256 {
        self.settlement_balance
    }

    /// Tokens transferred in and not yet deposited, native decimals.
    pub fn custody(&self, token: Address) -> U256 {
        self.custody.get(&token).copied().unwrap_or_default()
    }

    pub fn is_settled(&self) -> bool {
        self.settlement.is_some()
    }

    /// Collateral left in the settled pool, zero before settlement.
    pub fn settled_collateral(&self) -> U256 {
        self.settlement.map(|s| s.collateral).unwrap_or_default()
    }

    /// Exposure held when the market was quit, zero before settlement.
    pub fn settled_position(&self) -> U256 {
        self.settlement.map(|s| s.position).unwrap_or_default()
    }

    /// Tokens handed over to the wrapper ahead of an open or deposit.
    pub fn transfer_in(&mut self, token: Address, amount: U256) -> Result<()> {
        let held = self.custody(token);
        let held = held.checked_add(amount).ok_or(LemmaError::Overflow)?;
        self.custody.insert(token, held);
        Ok(())
    }

    // ==== settlement token ====

    pub fn deposit_settlement_token(&mut self, caller: Address, amount: U256) -> Result<()> {
        self.only_usd_lemma(caller)?;
        if amount.is_zero() {
            return Err(LemmaError::ZeroAmount);
        }
        let token = self.config.settlement_token();
        self.check_custody(token, amount)?;

        self.exchange.deposit(self.config.account(), token, amount)?;
        self.take_custody(token, amount);
        self.settlement_balance += amount;

        info!(
            amount = %self.settlement_converter().from_unsigned::<4>(amount),
            balance = %self.settlement_converter().from_unsigned::<4>(self.settlement_balance),
            "Settlement token deposited"
        );
        Ok(())
    }

    /// Withdraws settlement token to the caller, bounded by the tracked
    /// balance and by what the vault still holds.
    pub fn withdraw_settlement_token(&mut self, caller: Address, amount: U256) -> Result<()> {
        self.only_usd_lemma(caller)?;
        if amount.is_zero() {
            return Err(LemmaError::ZeroAmount);
        }
        let token = self.config.settlement_token();
        let vault = self.exchange.balance_by_token(self.config.account(), token)?;
        let available = self.settlement_balance.min(vault);
        if amount > available {
            return Err(LemmaError::InsufficientBalance {
                requested: amount,
                available,
            });
        }

        self.exchange.withdraw(self.config.account(), token, amount)?;
        self.settlement_balance -= amount;

        info!(
            amount = %self.settlement_converter().from_unsigned::<4>(amount),
            balance = %self.settlement_converter().from_unsigned::<4>(self.settlement_balance),
            "Settlement token withdrawn"
        );
        Ok(())
    }

    // ==== trading ====

    /// Opens `amount` base units of exposure paid with `collateral_amount`.
    pub fn open(
        &mut self,
        caller: Address,
        amount: U256,
        collateral_amount: U256,
    ) -> Result<PositionChanged> {
        self.only_usd_lemma(caller)?;
        self.ensure_not_settled()?;
        let (size, fee, now) = self.market_context()?;
        let sizing = self
            .sizer()
            .open_given_base(amount, collateral_amount, self.config.collateral(), size, fee, now)
            .inspect_err(warn_on_capacity)?;
        self.execute_open(sizing, size)
    }

    /// Opens as much exposure as exactly `collateral_amount` buys after fees.
    pub fn open_w_exact_collateral(
        &mut self,
        caller: Address,
        collateral_amount: U256,
    ) -> Result<PositionChanged> {
        self.only_usd_lemma(caller)?;
        self.ensure_not_settled()?;
        let (size, fee, now) = self.market_context()?;
        let sizing = self
            .sizer()
            .open_given_collateral(collateral_amount, self.config.collateral(), size, fee, now)
            .inspect_err(warn_on_capacity)?;
        self.execute_open(sizing, size)
    }

    /// Closes `amount` base units of exposure releasing `collateral_amount`.
    ///
    /// After an emergency settlement the collateral is paid out of the
    /// settled pool and no trade takes place.
    pub fn close(
        &mut self,
        caller: Address,
        amount: U256,
        collateral_amount: U256,
    ) -> Result<CloseOutcome> {
        self.only_usd_lemma(caller)?;
        if self.settlement.is_some() {
            return self.pay_out_settled(collateral_amount);
        }
        let (size, fee, now) = self.market_context()?;
        let sizing = self.sizer().close_given_base(
            amount,
            collateral_amount,
            self.config.collateral(),
            size,
            fee,
            now,
        )?;
        self.execute_close(sizing, size)
    }

    /// Closes the exposure that `collateral_amount` stands for: the whole
    /// position when it equals what a full close returns, the proportional
    /// fraction otherwise.
    pub fn close_w_exact_collateral(
        &mut self,
        caller: Address,
        collateral_amount: U256,
    ) -> Result<CloseOutcome> {
        self.only_usd_lemma(caller)?;
        if self.settlement.is_some() {
            return self.pay_out_settled(collateral_amount);
        }
        let (size, fee, now) = self.market_context()?;
        let sizing = self.sizer().close_given_collateral(
            collateral_amount,
            self.config.collateral(),
            size,
            fee,
            now,
        )?;
        self.execute_close(sizing, size)
    }

    fn execute_open(&mut self, sizing: Sizing, size: I256) -> Result<PositionChanged> {
        let account = self.config.account();
        let token = self.config.collateral();
        self.check_custody(token, sizing.collateral)?;
        debug!(request = ?sizing.request, exposure = %sizing.exposure, "Sized open");

        let pending = self.pending_funding()?;
        self.exchange.deposit(account, token, sizing.collateral)?;
        let fill = match self.exchange.open_position(account, &sizing.request) {
            Ok(fill) => fill,
            Err(e) => {
                if let Err(undo) = self.exchange.withdraw(account, token, sizing.collateral) {
                    error!(?undo, "Failed to withdraw collateral of a rejected open");
                }
                return Err(e.into());
            }
        };
        self.take_custody(token, sizing.collateral);
        self.fold_funding(pending);

        info!(
            collateral = %sizing.collateral,
            base = ?Converter::canonical().from_signed::<4>(fill.base),
            quote = ?Converter::canonical().from_signed::<4>(fill.quote),
            "Position opened"
        );
        self.log_transition(size, size + fill.base);
        Ok(fill)
    }

    fn execute_close(&mut self, sizing: Sizing, size: I256) -> Result<CloseOutcome> {
        let account = self.config.account();
        let token = self.config.collateral();
        let available = self.attributable_collateral()?;
        if sizing.collateral > available {
            return Err(LemmaError::InsufficientBalance {
                requested: sizing.collateral,
                available,
            });
        }
        debug!(request = ?sizing.request, "Sized close");

        let pending = self.pending_funding()?;
        self.exchange.withdraw(account, token, sizing.collateral)?;
        let fill = match self.exchange.open_position(account, &sizing.request) {
            Ok(fill) => fill,
            Err(e) => {
                if let Err(undo) = self.exchange.deposit(account, token, sizing.collateral) {
                    error!(?undo, "Failed to return collateral of a rejected close");
                }
                return Err(e.into());
            }
        };
        self.fold_funding(pending);

        info!(
            collateral = %sizing.collateral,
            base = ?Converter::canonical().from_signed::<4>(fill.base),
            quote = ?Converter::canonical().from_signed::<4>(fill.quote),
            "Position closed"
        );
        self.log_transition(size, size + fill.base);
        Ok(CloseOutcome {
            fill: Some(fill),
            collateral: sizing.collateral,
        })
    }

    fn pay_out_settled(&mut self, collateral_amount: U256) -> Result<CloseOutcome> {
        if collateral_amount.is_zero() {
            return Err(LemmaError::ZeroAmount);
        }
        let Some(settlement) = self.settlement.as_mut() else {
            return Err(LemmaError::InsufficientBalance {
                requested: collateral_amount,
                available: U256::ZERO,
            });
        };
        if collateral_amount > settlement.collateral {
            return Err(LemmaError::InsufficientBalance {
                requested: collateral_amount,
                available: settlement.collateral,
            });
        }
        settlement.collateral -= collateral_amount;
        info!(
            collateral = %collateral_amount,
            remaining = %settlement.collateral,
            "Paid out of settled pool"
        );
        Ok(CloseOutcome {
            fill: None,
            collateral: collateral_amount,
        })
    }

    // ==== queries ====

    /// Collateral (native units) required to open, or returned by closing,
    /// `base` units of exposure at current prices and fee.
    pub fn collateral_amount_given_underlying_asset_amount(
        &self,
        base: U256,
        is_opening: bool,
    ) -> Result<U256> {
        let fee = self.fee()?;
        let now = self.exchange.block_timestamp();
        self.sizer().collateral_amount_given_underlying_asset_amount(
            base,
            self.config.collateral(),
            is_opening,
            fee,
            now,
        )
    }

    /// Value of the deposited collateral over the value of the position.
    pub fn calc_leverage(&self) -> Result<Leverage> {
        let size = self.size()?;
        if size.is_zero() {
            return Ok(Leverage::ZERO);
        }
        let now = self.exchange.block_timestamp();
        let token = self.config.collateral();
        let valuator = self.valuator();
        let deposited = self.exchange.balance_by_token(self.config.account(), token)?;
        let collateral_value = valuator.settlement_value(token, deposited, now)?;
        let index = valuator.index_price(self.asset()?.market())?;
        let leverage = Leverage::compute(collateral_value, size.unsigned_abs(), index)?;
        debug!(leverage = %leverage.as_decimal(), "Leverage computed");
        Ok(leverage)
    }

    pub fn position(&self) -> Result<PositionSnapshot> {
        let size = self.size()?;
        let collateral = self
            .exchange
            .balance_by_token(self.config.account(), self.config.collateral())?;
        let account_value = self.exchange.account_value(self.config.account())?;
        Ok(PositionSnapshot {
            size,
            collateral,
            account_value,
            state: state_of(size),
        })
    }

    pub fn state(&self) -> Result<LemmaState> {
        Ok(state_of(self.size()?))
    }

    /// Signed position size at the exchange, canonical base units.
    pub fn size(&self) -> Result<I256> {
        let market = self.asset()?.market();
        Ok(self
            .exchange
            .total_position_size(self.config.account(), market)?)
    }

    pub fn fee(&self) -> Result<FeeRatio> {
        let market = self.asset()?.market();
        FeeRatio::new(self.exchange.fee_ratio(market)?)
    }

    /// Funding PnL accrued so far, settled or not, canonical quote.
    pub fn funding_pnl(&self) -> Result<I256> {
        Ok(self.funding.funding_pnl(self.pending_funding()?))
    }

    pub fn realized_funding_pnl(&self) -> I256 {
        self.funding.realized()
    }

    pub fn unrealized_funding_pnl(&self) -> Result<I256> {
        Ok(self.funding.unrealized(self.pending_funding()?))
    }

    // ==== funding ====

    /// Settles pending funding at the exchange and folds it into the ledger.
    pub fn settle_funding(&mut self) -> Result<()> {
        let pending = self.pending_funding()?;
        self.exchange.settle_all_funding(self.config.account())?;
        self.funding.fold(pending);
        if !pending.is_zero() {
            debug!(%pending, total = %self.funding.total(), "Funding settled");
        }
        Ok(())
    }

    /// Settles `pending`, read before a trade that has just succeeded.
    ///
    /// The ledger reports the same funding PnL folded or not, so a failed
    /// settlement is logged and left to the next call.
    fn fold_funding(&mut self, pending: I256) {
        if pending.is_zero() {
            return;
        }
        match self.exchange.settle_all_funding(self.config.account()) {
            Ok(()) => {
                self.funding.fold(pending);
                debug!(%pending, total = %self.funding.total(), "Funding settled");
            }
            Err(e) => error!(?e, %pending, "Failed to settle funding after a trade"),
        }
    }

    /// Trades `amount` of unrealized funding PnL into the position.
    ///
    /// `rebalancer` is the account that initiated the call through the
    /// USDLemma and has to be the configured rebalancer. Realizing counts
    /// `amount` as done, so a retry after success is rejected.
    pub fn rebalance(
        &mut self,
        caller: Address,
        rebalancer: Address,
        amount: I256,
        params: RebalanceParams,
    ) -> Result<PositionChanged> {
        self.only_usd_lemma(caller)?;
        if self.config.rebalancer().is_zero() || rebalancer != self.config.rebalancer() {
            return Err(LemmaError::Unauthorized(rebalancer));
        }
        self.ensure_not_settled()?;

        let pending = self.pending_funding()?;
        self.funding.check_realizable(amount, pending)?;
        let (size, fee, _) = self.market_context()?;
        let deadline = match params.deadline {
            0 => TradeRequest::NO_DEADLINE,
            deadline => deadline,
        };
        let request = self
            .sizer()
            .rebalance_request(amount, self.config.collateral(), size, fee)
            .inspect_err(warn_on_capacity)?
            .with_deadline(deadline);

        let fill = self.exchange.open_position(self.config.account(), &request)?;
        self.funding.realize(amount);
        self.fold_funding(pending);

        info!(
            %amount,
            realized = %self.funding.realized(),
            base = ?Converter::canonical().from_signed::<4>(fill.base),
            "Funding rebalanced"
        );
        Ok(fill)
    }

    // ==== emergency settlement ====

    /// Quits a closed market and withdraws the collateral backing the
    /// position into the settled pool.
    pub fn settle(&mut self, caller: Address) -> Result<U256> {
        self.only_usd_lemma(caller)?;
        self.ensure_not_settled()?;
        let account = self.config.account();
        let market = self.asset()?.market();
        match self.exchange.market_status(market)? {
            MarketStatus::Closed => {}
            status => {
                warn!(%market, ?status, "Settlement refused, market not closed");
                return Err(LemmaError::MarketNotClosed(market));
            }
        }

        let position = self.config.side().held(self.size()?);
        let collateral = self.attributable_collateral()?;
        let token = self.config.collateral();
        if !collateral.is_zero() {
            self.exchange.withdraw(account, token, collateral)?;
        }
        if let Err(e) = self.exchange.quit_market(account, market) {
            if !collateral.is_zero() {
                if let Err(undo) = self.exchange.deposit(account, token, collateral) {
                    error!(?undo, "Failed to return collateral of a rejected settlement");
                }
            }
            return Err(e.into());
        }
        self.settlement = Some(Settlement {
            collateral,
            position,
        });

        info!(%collateral, %position, "Position settled");
        Ok(collateral)
    }

    // ==== owner ====

    pub fn set_usd_lemma(&mut self, caller: Address, usd_lemma: Address) -> Result<()> {
        self.only_owner(caller)?;
        if usd_lemma.is_zero() {
            return Err(LemmaError::ZeroAddress("usd lemma"));
        }
        self.config.set_usd_lemma(usd_lemma);
        info!(%usd_lemma, "USDLemma updated");
        Ok(())
    }

    pub fn set_rebalancer(&mut self, caller: Address, rebalancer: Address) -> Result<()> {
        self.only_owner(caller)?;
        if rebalancer.is_zero() {
            return Err(LemmaError::ZeroAddress("rebalancer"));
        }
        self.config.set_rebalancer(rebalancer);
        info!(%rebalancer, "Rebalancer updated");
        Ok(())
    }

    /// Sets the position ceiling of the backed collateral, canonical base
    /// units.
    pub fn set_max_position(&mut self, caller: Address, max_position: U256) -> Result<()> {
        self.only_owner(caller)?;
        self.registry
            .set_max_position(self.config.collateral(), max_position)?;
        info!(max_position = %Converter::canonical().from_unsigned::<4>(max_position), "Max position updated");
        Ok(())
    }

    // ==== helpers ====

    fn only_usd_lemma(&self, caller: Address) -> Result<()> {
        if caller != self.config.usd_lemma() {
            return Err(LemmaError::Unauthorized(caller));
        }
        Ok(())
    }

    fn only_owner(&self, caller: Address) -> Result<()> {
        if caller != self.config.owner() {
            return Err(LemmaError::Unauthorized(caller));
        }
        Ok(())
    }

    fn ensure_not_settled(&self) -> Result<()> {
        if self.settlement.is_some() {
            return Err(LemmaError::AlreadySettled);
        }
        Ok(())
    }

    fn valuator(&self) -> CollateralValuator<'_, O> {
        CollateralValuator::new(
            &self.registry,
            &self.oracle,
            self.config.max_price_age(),
            self.config.twap_interval(),
        )
    }

    fn sizer(&self) -> PositionSizer<'_, O> {
        PositionSizer::new(self.valuator(), self.config.side())
    }

    fn market_context(&self) -> Result<(I256, FeeRatio, u64)> {
        Ok((self.size()?, self.fee()?, self.exchange.block_timestamp()))
    }

    fn pending_funding(&self) -> Result<I256> {
        let market = self.asset()?.market();
        Ok(self
            .exchange
            .pending_funding_payment(self.config.account(), market)?)
    }

    /// Vault collateral backing the position, excluding settlement token
    /// deposited separately when both are the same token.
    fn attributable_collateral(&self) -> Result<U256> {
        let token = self.config.collateral();
        let vault = self.exchange.balance_by_token(self.config.account(), token)?;
        if token == self.config.settlement_token() {
            Ok(vault.saturating_sub(self.settlement_balance))
        } else {
            Ok(vault)
        }
    }

    fn check_custody(&self, token: Address, amount: U256) -> Result<()> {
        let available = self.custody(token);
        if amount > available {
            return Err(LemmaError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        Ok(())
    }

    // Callers check the balance first.
    fn take_custody(&mut self, token: Address, amount: U256) {
        if let Some(held) = self.custody.get_mut(&token) {
            *held = held.saturating_sub(amount);
        }
    }

    fn settlement_converter(&self) -> Converter {
        Converter::new(self.config.settlement_decimals())
    }

    fn log_transition(&self, before: I256, after: I256) {
        let (from, to) = (state_of(before), state_of(after));
        if from != to {
            info!(?from, ?to, "Wrapper state changed");
        }
    }
}

fn state_of(size: I256) -> LemmaState {
    if size.is_zero() {
        LemmaState::Idle
    } else {
        LemmaState::Open
    }
}

fn warn_on_capacity(e: &LemmaError) {
    if let LemmaError::MaxPositionReached {
        current,
        requested,
        max,
    } = e
    {
        warn!(%current, %requested, %max, "Open rejected, max position reached");
    }
}
