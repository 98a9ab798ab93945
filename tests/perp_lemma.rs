use alloy::primitives::{I256, U256};
use perp_lemma::{
    error::{ExchangeError, LemmaError},
    exchange::PerpExchange,
    state::Leverage,
    testing::{LemmaBuilder, ether, named_address, usd},
    types::{LemmaState, PositionType},
};

fn wei(amount: u64) -> U256 {
    U256::from(amount)
}

fn short(amount: U256) -> I256 {
    -I256::try_from(amount).unwrap()
}

/// `amount * (1 - fee)^2` for the default 1% fee.
fn twice_net_of_fee(amount: U256) -> U256 {
    amount * U256::from(990_000u64 * 990_000) / U256::from(1_000_000_000_000u64)
}

fn abs_diff(a: U256, b: U256) -> U256 {
    if a > b { a - b } else { b - a }
}

// ==== round trip ====

#[test]
fn test_round_trip_returns_collateral_net_of_fees() {
    for collateral in [ether(1), wei(1_234_567_891_234_567_891), ether(37)] {
        let mut t = LemmaBuilder::new().build();

        t.open(collateral);
        let closeable = t.closeable();
        let outcome = t.close(closeable);

        assert_eq!(outcome.collateral, closeable);
        assert!(outcome.fill.is_some());
        assert_eq!(t.size(), I256::ZERO);
        let expected = twice_net_of_fee(collateral);
        assert!(
            abs_diff(outcome.collateral, expected) <= wei(1),
            "{} vs {expected}",
            outcome.collateral
        );
    }
}

#[test]
fn test_exact_amounts_of_one_ether() {
    let mut t = LemmaBuilder::new().build();

    let fill = t.open(ether(1));
    assert_eq!(fill.base, short(wei(990_000_000_000_000_000)));
    assert_eq!(t.size(), short(wei(990_000_000_000_000_000)));
    assert_eq!(t.closeable(), wei(980_100_000_000_000_000));

    // proportional close of half of what a full close returns
    t.close(wei(490_050_000_000_000_000));
    assert_eq!(t.size(), short(wei(495_000_000_000_000_000)));
    assert_eq!(t.lemma.state().unwrap(), LemmaState::Open);
}

#[test]
fn test_close_beyond_position() {
    let mut t = LemmaBuilder::new().build();
    t.open(ether(1));

    let res = t.lemma.close_w_exact_collateral(t.usd_lemma, ether(1));
    assert_eq!(
        res,
        Err(LemmaError::InsufficientPosition {
            requested: ether(1),
            available: wei(980_100_000_000_000_000),
        })
    );
    assert_eq!(t.size(), short(wei(990_000_000_000_000_000)));
}

#[test]
fn test_caller_sized_open_and_close() {
    let mut t = LemmaBuilder::new().build();
    let base = ether(1);

    let required = t
        .lemma
        .collateral_amount_given_underlying_asset_amount(base, true)
        .unwrap();
    t.fund(required);
    assert_eq!(
        t.lemma.open(t.usd_lemma, base, required - wei(1)),
        Err(LemmaError::InsufficientCollateral {
            required,
            provided: required - wei(1),
        })
    );
    t.lemma.open(t.usd_lemma, base, required).unwrap();
    assert_eq!(t.size(), short(base));

    let returned = t
        .lemma
        .collateral_amount_given_underlying_asset_amount(base, false)
        .unwrap();
    assert!(matches!(
        t.lemma.close(t.usd_lemma, base, returned + wei(1)),
        Err(LemmaError::InsufficientCollateral { .. })
    ));
    let outcome = t.lemma.close(t.usd_lemma, base, returned).unwrap();
    assert_eq!(outcome.collateral, returned);
    assert_eq!(t.size(), I256::ZERO);
}

#[test]
fn test_long_wrapper_mirrors_directions() {
    let mut t = LemmaBuilder::new().side(PositionType::Long).build();

    let fill = t.open(ether(1));
    assert_eq!(fill.base, I256::try_from(wei(990_000_000_000_000_000)).unwrap());

    let closeable = t.closeable();
    assert_eq!(closeable, wei(980_100_000_000_000_000));
    t.close(closeable);
    assert_eq!(t.size(), I256::ZERO);
}

// ==== leverage ====

#[test]
fn test_flat_position_reports_zero_leverage() {
    let mut t = LemmaBuilder::new().build();
    assert_eq!(t.lemma.calc_leverage().unwrap(), Leverage::ZERO);

    t.open(ether(3));
    let closeable = t.closeable();
    t.close(closeable);

    // collateral left over from fees does not make a flat position leveraged
    assert!(!t.lemma.position().unwrap().collateral.is_zero());
    assert_eq!(t.lemma.calc_leverage().unwrap(), Leverage::ZERO);
}

#[test]
fn test_open_sized_by_inverse_query_has_leverage_one() {
    let mut t = LemmaBuilder::new().build();
    let base = ether(1);

    let collateral = t
        .lemma
        .collateral_amount_given_underlying_asset_amount(base, true)
        .unwrap();
    assert_eq!(collateral, wei(1_010_101_010_101_010_102));

    t.fund(collateral);
    t.lemma.open(t.usd_lemma, base, collateral).unwrap();

    let leverage = t.lemma.calc_leverage().unwrap();
    assert_eq!(leverage.unit, U256::from(1));
    assert_eq!(leverage.six_decimals, U256::from(1_010_101));
}

#[test]
fn test_exact_collateral_open_covers_requested_base() {
    let mut t = LemmaBuilder::new().build();
    let base = wei(123_456_789_123_456_789);

    let collateral = t
        .lemma
        .collateral_amount_given_underlying_asset_amount(base, true)
        .unwrap();
    let fill = t.open(collateral);

    assert!(fill.base_filled() >= base);
    assert!(fill.base_filled() - base <= wei(2));
}

// ==== lifecycle ====

#[test]
fn test_idle_open_idle() {
    let mut t = LemmaBuilder::new().build();
    assert_eq!(t.lemma.state().unwrap(), LemmaState::Idle);

    t.open(ether(1));
    let position = t.lemma.position().unwrap();
    assert_eq!(position.state, LemmaState::Open);
    assert!(!position.size.is_zero());
    assert_eq!(position.collateral, ether(1));
    // 2000 USD of WETH less the 19.8 USD fee
    assert_eq!(
        position.account_value,
        I256::try_from(ether(19_802) / U256::from(10)).unwrap()
    );
    assert_eq!(t.lemma.calc_leverage().unwrap().unit, U256::from(1));

    let closeable = t.closeable();
    t.close(closeable);
    let position = t.lemma.position().unwrap();
    assert_eq!(position.state, LemmaState::Idle);
    assert_eq!(position.size, I256::ZERO);
    assert_eq!(t.lemma.calc_leverage().unwrap(), Leverage::ZERO);
}

// ==== capacity ====

#[test]
fn test_max_position_rejects_without_state_change() {
    let mut t = LemmaBuilder::new().max_position(ether(90)).build();

    t.fund(ether(91));
    assert_eq!(
        t.lemma.open_w_exact_collateral(t.usd_lemma, ether(91)),
        Err(LemmaError::MaxPositionReached {
            current: U256::ZERO,
            requested: ether(91),
            max: ether(90),
        })
    );
    assert_eq!(t.size(), I256::ZERO);
    assert_eq!(t.lemma.position().unwrap().collateral, U256::ZERO);
    assert_eq!(t.lemma.custody(t.asset.token()), ether(91));

    t.lemma.open_w_exact_collateral(t.usd_lemma, ether(89)).unwrap();
    let size = t.size();

    // 88.11 held + 2 requested crosses the ceiling
    let res = t.lemma.open_w_exact_collateral(t.usd_lemma, ether(2));
    assert!(matches!(res, Err(LemmaError::MaxPositionReached { .. })));
    assert!(res.unwrap_err().is_retryable());
    assert_eq!(t.size(), size);
    assert_eq!(t.lemma.position().unwrap().collateral, ether(89));
    assert_eq!(t.lemma.custody(t.asset.token()), ether(2));
}

#[test]
fn test_uncapped_max_position() {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        let mut t = LemmaBuilder::new().build();
        t.lemma.set_max_position(t.owner, U256::MAX).unwrap();

        t.open(ether(1_000));
        assert_eq!(t.lemma.calc_leverage().unwrap().unit, U256::from(1));
        let position = t.lemma.position().unwrap();
        assert!(format!("{position:?}").contains("Open"));
    });
}

#[test]
fn test_open_needs_collateral_in_custody() {
    let mut t = LemmaBuilder::new().build();
    t.fund(ether(1));

    assert_eq!(
        t.lemma.open_w_exact_collateral(t.usd_lemma, ether(2)),
        Err(LemmaError::InsufficientBalance {
            requested: ether(2),
            available: ether(1),
        })
    );
}

// ==== failures ====

#[test]
fn test_rejected_trade_leaves_no_trace() {
    let mut t = LemmaBuilder::new().build();
    t.fund(ether(1));

    t.exchange()
        .fail_next_trade(ExchangeError::Reverted("boom".into()));
    assert_eq!(
        t.lemma.open_w_exact_collateral(t.usd_lemma, ether(1)),
        Err(LemmaError::Exchange(ExchangeError::Reverted("boom".into())))
    );
    assert_eq!(t.size(), I256::ZERO);
    assert_eq!(t.lemma.position().unwrap().collateral, U256::ZERO);
    assert_eq!(t.lemma.custody(t.asset.token()), ether(1));

    // a rejected close returns the collateral to the vault
    t.lemma.open_w_exact_collateral(t.usd_lemma, ether(1)).unwrap();
    t.exchange()
        .fail_next_trade(ExchangeError::Transport("timeout".into()));
    let res = t.lemma.close_w_exact_collateral(t.usd_lemma, wei(980_100_000_000_000_000));
    assert!(res.unwrap_err().is_retryable());
    assert_eq!(t.lemma.position().unwrap().collateral, ether(1));
    assert_eq!(t.size(), short(wei(990_000_000_000_000_000)));
}

#[test]
fn test_failed_open_leaves_funding_pending() {
    let mut t = LemmaBuilder::new().build();
    t.open(ether(10));
    let market = t.market;
    t.exchange()
        .accrue_funding(market, I256::try_from(ether(1)).unwrap());
    let pending = short(wei(9_900_000_000_000_000_000));
    let funding = t.lemma.funding_pnl().unwrap();
    assert_eq!(funding, -pending);

    t.fund(ether(1));
    t.exchange()
        .fail_next_trade(ExchangeError::Transport("timeout".into()));
    assert!(t.lemma.open_w_exact_collateral(t.usd_lemma, ether(1)).is_err());
    assert_eq!(
        t.lemma.exchange().pending_funding_payment(t.account, market),
        Ok(pending)
    );
    assert_eq!(t.lemma.funding_pnl().unwrap(), funding);

    // settled once the trade goes through, without changing the total
    t.lemma.open_w_exact_collateral(t.usd_lemma, ether(1)).unwrap();
    assert_eq!(
        t.lemma.exchange().pending_funding_payment(t.account, market),
        Ok(I256::ZERO)
    );
    assert_eq!(t.lemma.funding_pnl().unwrap(), funding);
}

#[test]
fn test_stale_collateral_price_is_rejected() {
    let mut t = LemmaBuilder::new().build();
    t.fund(ether(1));
    t.oracle.advance(3_601);

    assert!(matches!(
        t.lemma.open_w_exact_collateral(t.usd_lemma, ether(1)),
        Err(LemmaError::StalePrice { .. })
    ));
    assert!(t.lemma.calc_leverage().is_ok());
    assert_eq!(t.lemma.custody(t.asset.token()), ether(1));
}

#[test]
fn test_paused_market_rejects_trades() {
    let mut t = LemmaBuilder::new().build();
    t.fund(ether(1));
    let market = t.market;
    t.exchange().pause_market(market);

    assert!(matches!(
        t.lemma.open_w_exact_collateral(t.usd_lemma, ether(1)),
        Err(LemmaError::Exchange(ExchangeError::MarketUnavailable { .. }))
    ));
    assert_eq!(t.lemma.position().unwrap().collateral, U256::ZERO);
    assert_eq!(t.lemma.settle(t.usd_lemma), Err(LemmaError::MarketNotClosed(market)));
}

// ==== settlement token ====

#[test]
fn test_settlement_token_deposit_and_withdraw() {
    let mut t = LemmaBuilder::new().build();
    let token = t.settlement.token();
    t.lemma.transfer_in(token, usd(1_000)).unwrap();

    t.lemma.deposit_settlement_token(t.usd_lemma, usd(1_000)).unwrap();
    assert_eq!(t.lemma.settlement_balance(), usd(1_000));
    assert_eq!(t.lemma.custody(token), U256::ZERO);

    t.lemma.withdraw_settlement_token(t.usd_lemma, usd(400)).unwrap();
    assert_eq!(t.lemma.settlement_balance(), usd(600));
    assert_eq!(
        t.lemma.withdraw_settlement_token(t.usd_lemma, usd(601)),
        Err(LemmaError::InsufficientBalance {
            requested: usd(601),
            available: usd(600),
        })
    );
    assert_eq!(
        t.lemma.deposit_settlement_token(t.usd_lemma, usd(1)),
        Err(LemmaError::InsufficientBalance {
            requested: usd(1),
            available: U256::ZERO,
        })
    );
    assert_eq!(
        t.lemma.withdraw_settlement_token(t.usd_lemma, U256::ZERO),
        Err(LemmaError::ZeroAmount)
    );
}

// ==== access control ====

#[test]
fn test_only_usd_lemma_moves_funds() {
    let mut t = LemmaBuilder::new().build();
    let stranger = named_address("stranger");
    t.fund(ether(1));

    assert_eq!(
        t.lemma.open_w_exact_collateral(stranger, ether(1)),
        Err(LemmaError::Unauthorized(stranger))
    );
    assert_eq!(
        t.lemma.open_w_exact_collateral(t.owner, ether(1)),
        Err(LemmaError::Unauthorized(t.owner))
    );
    assert_eq!(
        t.lemma.deposit_settlement_token(stranger, usd(1)),
        Err(LemmaError::Unauthorized(stranger))
    );
    assert_eq!(t.lemma.settle(stranger), Err(LemmaError::Unauthorized(stranger)));
}

#[test]
fn test_owner_setters() {
    let mut t = LemmaBuilder::new().build();
    let successor = named_address("usd-lemma-v2");

    assert_eq!(
        t.lemma.set_usd_lemma(t.usd_lemma, successor),
        Err(LemmaError::Unauthorized(t.usd_lemma))
    );
    assert_eq!(
        t.lemma.set_rebalancer(t.owner, alloy::primitives::Address::ZERO),
        Err(LemmaError::ZeroAddress("rebalancer"))
    );

    t.lemma.set_usd_lemma(t.owner, successor).unwrap();
    t.fund(ether(2));
    assert_eq!(
        t.lemma.open_w_exact_collateral(t.usd_lemma, ether(1)),
        Err(LemmaError::Unauthorized(t.usd_lemma))
    );
    t.lemma.open_w_exact_collateral(successor, ether(1)).unwrap();

    t.lemma.set_max_position(t.owner, ether(1)).unwrap();
    assert!(matches!(
        t.lemma.open_w_exact_collateral(successor, ether(1)),
        Err(LemmaError::MaxPositionReached { .. })
    ));
}

// ==== emergency settlement ====

#[test]
fn test_settle_closed_market() {
    let mut t = LemmaBuilder::new().build();
    t.open(ether(1));
    let market = t.market;

    assert_eq!(t.lemma.settle(t.usd_lemma), Err(LemmaError::MarketNotClosed(market)));

    t.exchange().close_market(market, ether(2_000));
    assert_eq!(t.lemma.settle(t.usd_lemma), Ok(ether(1)));
    assert!(t.lemma.is_settled());
    assert_eq!(t.lemma.settled_position(), wei(990_000_000_000_000_000));
    assert_eq!(t.lemma.state().unwrap(), LemmaState::Idle);
    assert_eq!(t.lemma.settle(t.usd_lemma), Err(LemmaError::AlreadySettled));

    t.fund(ether(1));
    assert_eq!(
        t.lemma.open_w_exact_collateral(t.usd_lemma, ether(1)),
        Err(LemmaError::AlreadySettled)
    );

    // closes are paid out of the settled pool
    let outcome = t.close(ether(1) / U256::from(2));
    assert_eq!(outcome.fill, None);
    assert_eq!(outcome.collateral, ether(1) / U256::from(2));
    assert_eq!(t.lemma.settled_collateral(), ether(1) / U256::from(2));
    assert_eq!(
        t.lemma.close_w_exact_collateral(t.usd_lemma, ether(1)),
        Err(LemmaError::InsufficientBalance {
            requested: ether(1),
            available: ether(1) / U256::from(2),
        })
    );
}

#[test]
fn test_rejected_settlement_keeps_collateral_at_the_exchange() {
    let mut t = LemmaBuilder::new().build();
    t.open(ether(1));
    let market = t.market;
    let size = t.size();
    t.exchange().close_market(market, ether(2_000));

    t.exchange()
        .fail_next_trade(ExchangeError::Reverted("quit".into()));
    assert_eq!(
        t.lemma.settle(t.usd_lemma),
        Err(LemmaError::Exchange(ExchangeError::Reverted("quit".into())))
    );
    assert!(!t.lemma.is_settled());
    assert_eq!(t.lemma.settled_collateral(), U256::ZERO);
    assert_eq!(t.lemma.position().unwrap().collateral, ether(1));
    assert_eq!(t.size(), size);

    assert_eq!(t.lemma.settle(t.usd_lemma), Ok(ether(1)));
    assert!(t.lemma.is_settled());
}
