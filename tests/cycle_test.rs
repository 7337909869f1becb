//! Orchestrator tests against scripted ports.
//!
//! Tests cover:
//! - Per-symbol failure isolation
//! - Non-overlapping cycles
//! - Send-then-mutate ordering and delivery failures
//! - Repeat semantics (baseline reset, bound clearing)
//! - Cache reuse across alerts and cycles
//! - Rate limiting and the cycle deadline
//! - Running on the scheduler's runtime

mod common;

use common::*;
use std::time::Duration;
use tripwire::adapters::memory_repository::MemoryRepository;
use tripwire::domain::alert::{
    Alert, AlertKind, Comparison, IndicatorAlert, IndicatorCondition, PriceCondition, Timeframe, VolumeAlert,
};
use tripwire::domain::cycle::CycleState;
use tripwire::domain::engine_config::EngineConfig;
use tripwire::domain::error::EngineError;
use tripwire::domain::indicator_helpers::IndicatorField;

fn indicator_alert(id: i64, symbol: &str, condition: IndicatorCondition) -> Alert {
    Alert::Indicator(IndicatorAlert {
        id,
        owner: 1,
        symbol: symbol.to_string(),
        price_condition: PriceCondition::Above,
        price_value: 50.0,
        indicator: condition,
        timeframe: Timeframe::H1,
        repeat: true,
    })
}

mod failure_isolation {
    use super::*;

    #[tokio::test]
    async fn one_failing_symbol_leaves_the_others_evaluated() {
        let symbols = ["ADA", "BTC", "ETH", "SOL", "XRP"];
        let repo = MemoryRepository::with_alerts(
            symbols
                .iter()
                .enumerate()
                .map(|(i, s)| price_alert(i as i64 + 1, 1, s, PriceCondition::Above, 1.0)),
        );
        let mut market = ScriptedMarket::new().with_quote_error("XRP", EngineError::unavailable("XRP", "timeout"));
        for s in &symbols[..4] {
            market = market.with_quote(s, 10.0);
        }
        let h = Harness::new(repo, market, RecordingNotifier::new());

        let report = h.orchestrator.run_cycle().await;

        assert_eq!(report.symbols, 5);
        assert_eq!(report.quotes_ok, 4);
        assert_eq!(report.quotes_failed, 1);
        assert_eq!(report.triggered, 4);
        assert_eq!(report.skipped, 1);
        assert_eq!(h.notifier.count(), 4);
        assert!(h.notifier.messages().iter().all(|(_, m)| !m.contains("XRP")));
        // one-shot alerts on the healthy symbols are gone, the XRP one is untouched
        assert_eq!(h.repo.len(), 1);
        assert!(h.repo.get(AlertKind::Price, 5).is_some());
        assert_eq!(report.reached, CycleState::Dispatching);
        assert_eq!(h.orchestrator.state(), CycleState::Idle);
    }

    #[tokio::test]
    async fn invalid_alert_does_not_stop_its_batch() {
        let repo = MemoryRepository::with_alerts([
            percent_alert(1, "ETH", 0.0, 5.0, false),
            percent_alert(2, "ETH", 100.0, 5.0, false),
        ]);
        let market = ScriptedMarket::new().with_quote("ETH", 110.0);
        let h = Harness::new(repo, market, RecordingNotifier::new());

        let report = h.orchestrator.run_cycle().await;

        assert_eq!(report.invalid, 1);
        assert_eq!(report.triggered, 1);
        assert!(h.repo.get(AlertKind::Percent, 1).is_some());
        assert!(h.repo.get(AlertKind::Percent, 2).is_none());
    }

    #[tokio::test]
    async fn listing_failure_is_reported() {
        struct BrokenRepo;

        impl tripwire::ports::alert_repository::AlertRepository for BrokenRepo {
            fn session(
                &self,
            ) -> Result<Box<dyn tripwire::ports::alert_repository::AlertSession + '_>, EngineError> {
                Err(EngineError::persistence("database is locked"))
            }
        }

        let orchestrator = tripwire::domain::cycle::Orchestrator::new(
            std::sync::Arc::new(BrokenRepo),
            std::sync::Arc::new(ScriptedMarket::new()),
            std::sync::Arc::new(RecordingNotifier::new()),
            ManualClock::new(),
            EngineConfig::default(),
        );
        let report = orchestrator.run_cycle().await;

        assert_eq!(report.reached, CycleState::CollectingSymbols);
        assert!(report.error.as_deref().unwrap().contains("database is locked"));
        assert_eq!(orchestrator.state(), CycleState::Idle);
    }
}

mod mutual_exclusion {
    use super::*;

    #[tokio::test]
    async fn tick_during_running_cycle_is_skipped() {
        let gate = Gate::new();
        let repo = MemoryRepository::with_alerts([price_alert(1, 1, "BTC", PriceCondition::Above, 1.0)]);
        let market = ScriptedMarket::new().with_quote("BTC", 10.0).gated(gate.clone());
        let h = Harness::new(repo, market, RecordingNotifier::new());

        let first = tokio::spawn({
            let orchestrator = h.orchestrator.clone();
            async move { orchestrator.run_cycle().await }
        });
        gate.entered.notified().await;
        assert_eq!(h.orchestrator.state(), CycleState::FetchingQuotes);

        let second = h.orchestrator.run_cycle().await;
        assert!(second.skipped_busy);
        assert_eq!(second.alerts_evaluated, 0);

        gate.release.notify_one();
        let first = first.await.unwrap();
        assert!(!first.skipped_busy);
        assert_eq!(first.triggered, 1);
        assert_eq!(h.notifier.count(), 1);
        assert_eq!(h.market.quote_calls(), 1);
    }
}

mod send_then_mutate {
    use super::*;

    #[tokio::test]
    async fn failed_delivery_leaves_alert_in_place() {
        let repo = MemoryRepository::with_alerts([price_alert(1, 9, "BTC", PriceCondition::Above, 1.0)]);
        let market = ScriptedMarket::new().with_quote("BTC", 10.0);
        let h = Harness::new(repo, market, RecordingNotifier::failing());

        let report = h.orchestrator.run_cycle().await;

        assert_eq!(report.triggered, 1);
        assert_eq!(report.notifications_failed, 1);
        assert_eq!(report.mutations_applied, 0);
        assert!(h.repo.get(AlertKind::Price, 1).is_some());
    }

    #[tokio::test]
    async fn only_the_refused_owner_keeps_the_alert() {
        let repo = MemoryRepository::with_alerts([
            price_alert(1, 1, "BTC", PriceCondition::Above, 1.0),
            price_alert(2, 2, "BTC", PriceCondition::Above, 1.0),
        ]);
        let market = ScriptedMarket::new().with_quote("BTC", 10.0);
        let h = Harness::new(repo, market, RecordingNotifier::refusing(2));

        let report = h.orchestrator.run_cycle().await;

        assert_eq!(report.notifications_sent, 1);
        assert_eq!(report.notifications_failed, 1);
        assert!(h.repo.get(AlertKind::Price, 1).is_none());
        assert!(h.repo.get(AlertKind::Price, 2).is_some());
    }

    #[tokio::test]
    async fn failed_mutation_fires_again_next_cycle() {
        let repo = MemoryRepository::with_alerts([price_alert(1, 1, "BTC", PriceCondition::Above, 1.0)]);
        repo.fail_mutations(true);
        let market = ScriptedMarket::new().with_quote("BTC", 10.0);
        let h = Harness::new(repo, market, RecordingNotifier::new());

        let report = h.orchestrator.run_cycle().await;
        assert_eq!(report.mutations_failed, 1);

        h.repo.fail_mutations(false);
        let report = h.orchestrator.run_cycle().await;
        assert_eq!(report.mutations_applied, 1);
        assert_eq!(h.notifier.count(), 2);
        assert!(h.repo.is_empty());
    }
}

mod repeat_semantics {
    use super::*;

    #[tokio::test]
    async fn repeating_percent_alert_resets_its_baseline() {
        let repo = MemoryRepository::with_alerts([percent_alert(1, "ETH", 100.0, 5.0, true)]);
        let market = ScriptedMarket::new().with_quote("ETH", 106.0);
        let h = Harness::new(repo, market, RecordingNotifier::new());

        let report = h.orchestrator.run_cycle().await;
        assert_eq!(report.triggered, 1);
        let Some(Alert::Percent(p)) = h.repo.get(AlertKind::Percent, 1) else {
            panic!("percent alert deleted")
        };
        assert_eq!(p.base_price, 106.0);

        h.clock.advance(21);
        let report = h.orchestrator.run_cycle().await;
        assert_eq!(report.triggered, 0);
        assert_eq!(h.notifier.count(), 1);
    }

    #[tokio::test]
    async fn portfolio_loss_bound_clears_and_profit_bound_survives() {
        let repo = MemoryRepository::with_alerts([portfolio_limit(
            7,
            Some(50_000.0),
            Some(200_000.0),
            &[("BTC", 1.0), ("ETH", 10.0)],
        )]);
        let market = ScriptedMarket::new().with_quote("BTC", 40_000.0).with_quote("ETH", 1_000.0);
        let h = Harness::new(repo, market, RecordingNotifier::new());

        let report = h.orchestrator.run_cycle().await;
        assert_eq!(report.triggered, 1);
        let messages = h.notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, 7);
        assert!(messages[0].1.contains("Portfolio Loss Alert"));

        let Some(Alert::PortfolioLimit(limit)) = h.repo.get(AlertKind::PortfolioLimit, 7) else {
            panic!("limit removed")
        };
        assert_eq!(limit.loss_limit, None);
        assert_eq!(limit.profit_target, Some(200_000.0));

        // still below the old loss bound, but that bound is gone
        h.clock.advance(21);
        let report = h.orchestrator.run_cycle().await;
        assert_eq!(report.triggered, 0);

        h.market.set_quote("BTC", 195_000.0);
        h.clock.advance(21);
        let report = h.orchestrator.run_cycle().await;
        assert_eq!(report.triggered, 1);
        assert!(h.notifier.messages()[1].1.contains("Portfolio Target Reached"));
        // both bounds gone, the limit is no longer listed
        assert!(h.repo.get(AlertKind::PortfolioLimit, 7).is_some());
        h.clock.advance(21);
        let report = h.orchestrator.run_cycle().await;
        assert_eq!(report.alerts_evaluated, 0);
    }

    #[tokio::test]
    async fn partial_portfolio_is_skipped() {
        let repo = MemoryRepository::with_alerts([portfolio_limit(
            7,
            Some(1e12),
            None,
            &[("BTC", 1.0), ("NOPE", 1.0)],
        )]);
        let market = ScriptedMarket::new().with_quote("BTC", 40_000.0);
        let h = Harness::new(repo, market, RecordingNotifier::new());

        let report = h.orchestrator.run_cycle().await;
        assert_eq!(report.skipped, 1);
        assert_eq!(h.notifier.count(), 0);
    }
}

mod market_data {
    use super::*;

    #[tokio::test]
    async fn one_upstream_call_per_symbol_and_ttl() {
        let repo = MemoryRepository::with_alerts([
            price_alert(1, 1, "BTC", PriceCondition::Below, 1.0),
            price_alert(2, 2, "BTC", PriceCondition::Below, 2.0),
            price_alert(3, 3, "BTC", PriceCondition::Below, 3.0),
            indicator_alert(
                4,
                "BTC",
                IndicatorCondition::Compare {
                    field: IndicatorField::Rsi(14),
                    comparison: Comparison::Less,
                    value: 10.0,
                },
            ),
            indicator_alert(5, "BTC", IndicatorCondition::PriceAboveEma { period: 20 }),
        ]);
        let market = ScriptedMarket::new().with_quote("BTC", 130.0).with_candles("BTC", rising(120));
        let h = Harness::new(repo, market, RecordingNotifier::new());

        let report = h.orchestrator.run_cycle().await;
        assert_eq!(h.market.quote_calls(), 1);
        assert_eq!(h.market.candle_calls(), 1);
        assert_eq!(report.alerts_evaluated, 5);
        // only price > ema(20) holds on a rising series
        assert_eq!(report.triggered, 1);
        assert!(h.notifier.messages()[0].1.contains("`ema(20)`"));

        h.orchestrator.run_cycle().await;
        assert_eq!(h.market.quote_calls(), 1);
        assert_eq!(h.market.candle_calls(), 1);

        h.clock.advance(21);
        h.orchestrator.run_cycle().await;
        assert_eq!(h.market.quote_calls(), 2);
        assert_eq!(h.market.candle_calls(), 1);

        h.clock.advance(40);
        h.orchestrator.run_cycle().await;
        assert_eq!(h.market.candle_calls(), 2);
    }

    #[tokio::test]
    async fn short_history_skips_indicator_alert() {
        let repo = MemoryRepository::with_alerts([indicator_alert(
            1,
            "BTC",
            IndicatorCondition::Compare {
                field: IndicatorField::Rsi(14),
                comparison: Comparison::Greater,
                value: 0.0,
            },
        )]);
        let market = ScriptedMarket::new().with_quote("BTC", 100.0).with_candles("BTC", rising(10));
        let h = Harness::new(repo, market, RecordingNotifier::new());

        let report = h.orchestrator.run_cycle().await;
        assert_eq!(report.skipped, 1);
        assert_eq!(h.notifier.count(), 0);
    }

    #[tokio::test]
    async fn volume_alert_uses_volume_window() {
        let repo = MemoryRepository::with_alerts([Alert::Volume(VolumeAlert {
            id: 1,
            owner: 1,
            symbol: "SOL".into(),
            multiplier: 3.0,
            timeframe: Timeframe::H1,
            repeat: false,
        })]);
        let market = ScriptedMarket::new()
            .with_quote("SOL", 20.0)
            .with_volume("SOL", 5_000.0, 1_000.0);
        let h = Harness::new(repo, market, RecordingNotifier::new());

        let report = h.orchestrator.run_cycle().await;
        assert_eq!(report.triggered, 1);
        assert!(h.notifier.messages()[0].1.contains("Volume Alert: SOL"));
        assert!(h.repo.is_empty());
    }

    #[tokio::test]
    async fn volume_alert_without_quote_is_left_alone() {
        let repo = MemoryRepository::with_alerts([Alert::Volume(VolumeAlert {
            id: 1,
            owner: 1,
            symbol: "SOL".into(),
            multiplier: 3.0,
            timeframe: Timeframe::H1,
            repeat: false,
        })]);
        let market = ScriptedMarket::new()
            .with_quote_error("SOL", EngineError::unavailable("SOL", "timeout"))
            .with_volume("SOL", 5_000.0, 1_000.0);
        let h = Harness::new(repo, market, RecordingNotifier::new());

        let report = h.orchestrator.run_cycle().await;

        assert_eq!(report.quotes_failed, 1);
        assert_eq!(report.triggered, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(h.notifier.count(), 0);
        assert!(h.repo.get(AlertKind::Volume, 1).is_some());
    }

    #[tokio::test]
    async fn rate_limit_stops_remaining_quote_fetches() {
        let repo = MemoryRepository::with_alerts([
            price_alert(1, 1, "AAA", PriceCondition::Above, 1.0),
            price_alert(2, 1, "BBB", PriceCondition::Above, 1.0),
            price_alert(3, 1, "CCC", PriceCondition::Above, 1.0),
        ]);
        let market = ScriptedMarket::new()
            .with_quote_error(
                "AAA",
                EngineError::UpstreamRateLimited {
                    provider: PROVIDER.to_string(),
                },
            )
            .with_quote("BBB", 10.0)
            .with_quote("CCC", 10.0);
        let config = EngineConfig {
            fan_out: 1,
            ..EngineConfig::default()
        };
        let h = Harness::with_clock(repo, market, RecordingNotifier::new(), ManualClock::new(), config);

        let report = h.orchestrator.run_cycle().await;

        assert_eq!(h.market.quote_calls(), 1);
        assert_eq!(report.quotes_failed, 3);
        assert_eq!(report.rate_limited, vec![PROVIDER.to_string()]);
        assert_eq!(h.notifier.count(), 0);
        assert_eq!(h.repo.len(), 3);
    }
}

mod deadline {
    use super::*;

    #[tokio::test]
    async fn slow_fetch_abandons_evaluation() {
        let clock = ManualClock::new();
        let repo = MemoryRepository::with_alerts([price_alert(1, 1, "BTC", PriceCondition::Above, 1.0)]);
        let market = ScriptedMarket::new()
            .with_quote("BTC", 10.0)
            .advancing(clock.clone(), 30);
        let h = Harness::with_clock(repo, market, RecordingNotifier::new(), clock, EngineConfig::default());

        let report = h.orchestrator.run_cycle().await;

        assert!(report.deadline_exceeded);
        assert_eq!(report.abandoned, AlertKind::ALL.to_vec());
        assert_eq!(report.alerts_evaluated, 0);
        assert_eq!(h.notifier.count(), 0);
        assert!(h.repo.get(AlertKind::Price, 1).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_runs_cycles_until_shutdown() {
        let repo = MemoryRepository::with_alerts([percent_alert(1, "ETH", 100.0, 5.0, true)]);
        let market = ScriptedMarket::new().with_quote("ETH", 100.0);
        let h = Harness::new(repo, market, RecordingNotifier::new());

        let shutdown = tokio::time::sleep(Duration::from_secs(95));
        h.orchestrator.clone().run_until(shutdown).await;

        // ticks at 0s, 30s, 60s and 90s; the manual clock never moves, so
        // the quote stays cached after the first fetch
        assert_eq!(h.market.quote_calls(), 1);
        assert_eq!(h.orchestrator.state(), CycleState::Idle);
    }
}

mod runtime {
    use super::*;
    use std::sync::mpsc::{channel, Receiver};
    use std::sync::{Arc, Mutex};
    use tripwire::domain::cycle::Orchestrator;
    use tripwire::ports::alert_repository::{AlertRepository, AlertSession};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cycle_runs_as_a_spawned_task() {
        let repo = MemoryRepository::with_alerts([
            price_alert(1, 1, "BTC", PriceCondition::Above, 1.0),
            Alert::Volume(VolumeAlert {
                id: 2,
                owner: 1,
                symbol: "BTC".into(),
                multiplier: 2.0,
                timeframe: Timeframe::H1,
                repeat: true,
            }),
            indicator_alert(
                3,
                "BTC",
                IndicatorCondition::Compare {
                    field: IndicatorField::Rsi(14),
                    comparison: Comparison::Greater,
                    value: 50.0,
                },
            ),
        ]);
        let market = ScriptedMarket::new()
            .with_quote("BTC", 100.0)
            .with_volume("BTC", 300.0, 100.0)
            .with_candles("BTC", rising(120));
        let h = Harness::new(repo, market, RecordingNotifier::new());

        let orchestrator = h.orchestrator.clone();
        let report = tokio::spawn(async move { orchestrator.run_cycle().await })
            .await
            .unwrap();

        assert_eq!(report.triggered, 3);
        assert_eq!(h.notifier.count(), 3);
        assert!(h.repo.get(AlertKind::Price, 1).is_none());
    }

    /// Repository whose session waits for a signal sent by another task on
    /// the same runtime. Calling it inline on a current-thread runtime would
    /// starve that task, and the session times out.
    struct WaitingRepo {
        inner: MemoryRepository,
        go: Mutex<Receiver<()>>,
    }

    impl AlertRepository for WaitingRepo {
        fn session(&self) -> Result<Box<dyn AlertSession + '_>, EngineError> {
            self.go
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5))
                .map_err(|_| EngineError::persistence("runtime thread was blocked"))?;
            self.inner.session()
        }
    }

    #[tokio::test]
    async fn repository_calls_leave_the_runtime_thread_free() {
        let (tx, rx) = channel();
        let repo = WaitingRepo {
            inner: MemoryRepository::with_alerts([price_alert(1, 1, "BTC", PriceCondition::Above, 1_000.0)]),
            go: Mutex::new(rx),
        };
        let orchestrator = Orchestrator::new(
            Arc::new(repo),
            Arc::new(ScriptedMarket::new().with_quote("BTC", 10.0)),
            Arc::new(RecordingNotifier::new()),
            ManualClock::new(),
            EngineConfig::default(),
        );
        tokio::spawn(async move {
            let _ = tx.send(());
        });

        let report = orchestrator.run_cycle().await;

        assert_eq!(report.error, None);
        assert_eq!(report.alerts_evaluated, 1);
        assert_eq!(report.quotes_ok, 1);
    }
}
