use std::time::Duration;

use alloy::primitives::{I256, U256};
use perp_lemma::{
    error::{ExchangeError, LemmaError},
    exchange::PerpExchange,
    rebalance::{RebalanceConfig, Rebalancer},
    testing::{GENESIS, LemmaBuilder, TestLemma, ether, named_address},
    types::RebalanceParams,
};

fn signed(amount: U256) -> I256 {
    I256::try_from(amount).unwrap()
}

fn wei(amount: u64) -> I256 {
    I256::try_from(amount).unwrap()
}

/// Short wrapper opened with 10 ETH that has received 9.9 USD of funding.
fn funded() -> TestLemma {
    let mut t = LemmaBuilder::new().build();
    t.open(ether(10));
    let market = t.market;
    t.exchange().accrue_funding(market, signed(ether(1)));
    t
}

fn rebalancer(t: &TestLemma) -> Rebalancer {
    Rebalancer::new(RebalanceConfig::default(), t.rebalancer)
}

/// Tests that positive funding grows the short and lowers the leverage
/// without leaving the unit bucket.
#[test]
fn test_positive_funding_is_traded_into_the_position() {
    let mut t = funded();
    assert_eq!(t.lemma.funding_pnl().unwrap(), wei(9_900_000_000_000_000_000));
    assert_eq!(t.lemma.unrealized_funding_pnl().unwrap(), wei(9_900_000_000_000_000_000));
    let before = t.lemma.calc_leverage().unwrap();
    assert_eq!(before.six_decimals, U256::from(1_010_101));

    let fill = rebalancer(&t).run_once(&mut t.lemma).unwrap().unwrap();
    assert_eq!(fill.base, -wei(4_950_000_000_000_000));
    assert_eq!(fill.quote, wei(9_801_000_000_000_000_000));
    assert_eq!(t.size(), -wei(9_904_950_000_000_000_000));

    assert_eq!(t.lemma.realized_funding_pnl(), wei(9_900_000_000_000_000_000));
    assert_eq!(t.lemma.funding_pnl().unwrap(), wei(9_900_000_000_000_000_000));
    assert_eq!(t.lemma.unrealized_funding_pnl().unwrap(), I256::ZERO);

    let after = t.lemma.calc_leverage().unwrap();
    assert_eq!(after.six_decimals, U256::from(1_009_596));
    assert!(after.six_decimals < before.six_decimals);
    assert_eq!(after.unit, U256::from(1));
}

/// Tests that negative funding shrinks the position.
#[test]
fn test_negative_funding_shrinks_the_position() {
    let mut t = LemmaBuilder::new().build();
    t.open(ether(10));
    let market = t.market;
    t.exchange()
        .accrue_funding(market, -signed(ether(1) / U256::from(10)));
    assert_eq!(t.lemma.funding_pnl().unwrap(), -wei(990_000_000_000_000_000));

    let fill = rebalancer(&t).run_once(&mut t.lemma).unwrap().unwrap();
    assert_eq!(fill.base, wei(485_149_500_000_000));
    assert_eq!(t.size(), -wei(9_900_000_000_000_000_000) + wei(485_149_500_000_000));
    assert_eq!(t.lemma.realized_funding_pnl(), -wei(990_000_000_000_000_000));
    assert_eq!(t.lemma.unrealized_funding_pnl().unwrap(), I256::ZERO);
}

/// Tests that a retry after a successful rebalance does nothing.
#[test]
fn test_retry_never_double_counts() {
    let mut t = funded();
    let rebalancer = rebalancer(&t);

    assert!(rebalancer.run_once(&mut t.lemma).unwrap().is_some());
    let size = t.size();
    assert_eq!(rebalancer.run_once(&mut t.lemma).unwrap(), None);
    assert_eq!(t.size(), size);

    let amount = wei(9_900_000_000_000_000_000);
    assert_eq!(
        t.lemma
            .rebalance(t.usd_lemma, t.rebalancer, amount, RebalanceParams::default()),
        Err(LemmaError::InvalidRebalanceAmount {
            requested: amount,
            unrealized: I256::ZERO,
        })
    );
    assert_eq!(t.lemma.realized_funding_pnl(), amount);
}

/// Tests that a partial rebalance leaves the remainder to the next run.
#[test]
fn test_partial_rebalance_then_remainder() {
    let mut t = funded();

    t.lemma
        .rebalance(
            t.usd_lemma,
            t.rebalancer,
            signed(ether(4)),
            RebalanceParams::default(),
        )
        .unwrap();
    assert_eq!(
        t.lemma.unrealized_funding_pnl().unwrap(),
        wei(5_900_000_000_000_000_000)
    );

    let rebalancer = rebalancer(&t);
    rebalancer.run_once(&mut t.lemma).unwrap().unwrap();
    assert_eq!(t.lemma.realized_funding_pnl(), wei(9_900_000_000_000_000_000));
    assert_eq!(t.lemma.unrealized_funding_pnl().unwrap(), I256::ZERO);
}

#[test]
fn test_rebalance_amount_must_fit_unrealized() {
    let mut t = funded();
    let size = t.size();

    for amount in [I256::ZERO, signed(ether(10)), -signed(ether(1))] {
        let res = t
            .lemma
            .rebalance(t.usd_lemma, t.rebalancer, amount, RebalanceParams::default());
        assert_eq!(
            res,
            Err(LemmaError::InvalidRebalanceAmount {
                requested: amount,
                unrealized: wei(9_900_000_000_000_000_000),
            })
        );
    }
    assert_eq!(t.size(), size);
    assert_eq!(t.lemma.realized_funding_pnl(), I256::ZERO);
}

#[test]
fn test_rebalance_authorization() {
    let mut t = funded();
    let stranger = named_address("stranger");
    let amount = signed(ether(1));

    assert_eq!(
        t.lemma
            .rebalance(stranger, t.rebalancer, amount, RebalanceParams::default()),
        Err(LemmaError::Unauthorized(stranger))
    );
    assert_eq!(
        t.lemma
            .rebalance(t.usd_lemma, stranger, amount, RebalanceParams::default()),
        Err(LemmaError::Unauthorized(stranger))
    );

    t.lemma.set_rebalancer(t.owner, stranger).unwrap();
    assert!(
        t.lemma
            .rebalance(t.usd_lemma, stranger, amount, RebalanceParams::default())
            .is_ok()
    );
}

#[test]
fn test_expired_deadline_realizes_nothing() {
    let mut t = funded();
    let size = t.size();

    let res = t.lemma.rebalance(
        t.usd_lemma,
        t.rebalancer,
        signed(ether(1)),
        RebalanceParams {
            deadline: GENESIS - 1,
        },
    );
    assert_eq!(
        res,
        Err(LemmaError::Exchange(ExchangeError::DeadlineExpired {
            deadline: GENESIS - 1,
            now: GENESIS,
        }))
    );
    assert_eq!(t.size(), size);
    assert_eq!(t.lemma.realized_funding_pnl(), I256::ZERO);
    assert_eq!(t.lemma.funding_pnl().unwrap(), wei(9_900_000_000_000_000_000));
    assert_eq!(
        t.lemma.exchange().pending_funding_payment(t.account, t.market),
        Ok(-wei(9_900_000_000_000_000_000))
    );
}

/// Tests that funding traded into the position counts against the ceiling.
#[test]
fn test_growing_rebalance_stops_at_max_position() {
    let mut t = LemmaBuilder::new().max_position(ether(90)).build();
    t.open(ether(89));
    let market = t.market;
    t.exchange().accrue_funding(market, signed(ether(50)));
    let size = t.size();
    let unrealized = signed(ether(44_055) / U256::from(10));
    assert_eq!(t.lemma.unrealized_funding_pnl().unwrap(), unrealized);

    // 4405.5 USD at 2000 adds 2.20275 ETH to the 88.11 held
    let rebalancer = rebalancer(&t);
    let res = rebalancer.run_once(&mut t.lemma);
    assert_eq!(
        res,
        Err(LemmaError::MaxPositionReached {
            current: ether(8_811) / U256::from(100),
            requested: ether(220_275) / U256::from(100_000),
            max: ether(90),
        })
    );
    assert!(res.unwrap_err().is_retryable());
    assert_eq!(t.size(), size);
    assert_eq!(t.lemma.realized_funding_pnl(), I256::ZERO);
    assert_eq!(t.lemma.unrealized_funding_pnl().unwrap(), unrealized);

    t.lemma.set_max_position(t.owner, ether(100)).unwrap();
    rebalancer.run_once(&mut t.lemma).unwrap().unwrap();
    assert!(t.size().unsigned_abs() <= ether(100));
    assert_eq!(t.lemma.realized_funding_pnl(), unrealized);
}

/// Tests that funding paid away still rebalances at the ceiling, since
/// shrinking never grows exposure.
#[test]
fn test_shrinking_rebalance_ignores_max_position() {
    let mut t = LemmaBuilder::new().max_position(ether(90)).build();
    t.open(ether(89));
    let market = t.market;
    t.exchange()
        .accrue_funding(market, -signed(ether(1) / U256::from(10)));
    t.lemma.set_max_position(t.owner, ether(88)).unwrap();

    let fill = rebalancer(&t).run_once(&mut t.lemma).unwrap().unwrap();
    assert!(fill.base.is_positive());
    assert_eq!(t.lemma.unrealized_funding_pnl().unwrap(), I256::ZERO);
}

#[test]
fn test_min_amount_threshold() {
    let mut t = funded();
    let rebalancer = Rebalancer::new(
        RebalanceConfig {
            min_amount: ether(10),
            ..Default::default()
        },
        t.rebalancer,
    );

    assert_eq!(rebalancer.run_once(&mut t.lemma).unwrap(), None);
    assert_eq!(t.lemma.realized_funding_pnl(), I256::ZERO);
}

#[test]
fn test_settled_wrapper_is_not_rebalanced() {
    let mut t = funded();
    let market = t.market;
    t.exchange().close_market(market, ether(2_000));
    t.lemma.settle(t.usd_lemma).unwrap();

    assert_eq!(
        rebalancer(&t).run_once(&mut t.lemma),
        Err(LemmaError::AlreadySettled)
    );
}

/// Tests the polling driver: the first tick rebalances, later ticks find
/// nothing to do.
#[tokio::test]
async fn test_driver_rebalances_once() {
    let mut t = funded();
    let rebalancer = rebalancer(&t);

    let rebalanced = rebalancer
        .run(&mut t.lemma, Duration::from_millis(1), 3)
        .await;
    assert_eq!(rebalanced, 1);
    assert_eq!(t.lemma.unrealized_funding_pnl().unwrap(), I256::ZERO);
}

/// Tests that failures are retried on the next tick.
#[test]
fn test_driver_retries_failed_rebalance() {
    let mut t = funded();
    t.exchange()
        .fail_next_trade(ExchangeError::Transport("connection reset".into()));
    let rebalancer = rebalancer(&t);

    let rebalanced =
        tokio_test::block_on(rebalancer.run(&mut t.lemma, Duration::from_millis(1), 2));
    assert_eq!(rebalanced, 1);
    assert_eq!(t.lemma.realized_funding_pnl(), wei(9_900_000_000_000_000_000));
}
