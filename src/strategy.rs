use std::collections::HashMap;

use crate::event_bus::{EventBus, MarketDataEvent, SignalAction, SignalEvent};

/// Context handed to a strategy at each lifecycle hook. Carries the symbol
/// being traded and a handle to publish signals on the bus.
pub struct StrategyContext<'a> {
    pub symbol: String,
    bus: &'a mut EventBus,
}

impl<'a> StrategyContext<'a> {
    pub fn new(symbol: String, bus: &'a mut EventBus) -> Self {
        Self { symbol, bus }
    }

    pub fn emit(
        &mut self,
        action: SignalAction,
        price: f64,
        quantity: f64,
        reason: impl Into<String>,
        confidence: f64,
    ) {
        self.bus.publish_signal(SignalEvent {
            symbol: self.symbol.clone(),
            action,
            price,
            quantity,
            reason: reason.into(),
            confidence,
        });
    }
}

/// The strategy contract (spec §4.2): a capability set over
/// `{initialize, start, on_market_data, stop}`. Implementations must be
/// deterministic given identical bar inputs and parameters, and must not
/// perform I/O.
pub trait Strategy {
    fn initialize(&mut self, _ctx: &mut StrategyContext<'_>) {}

    fn start(&mut self, _ctx: &mut StrategyContext<'_>) {}

    fn on_market_data(&mut self, ctx: &mut StrategyContext<'_>, event: &MarketDataEvent);

    fn stop(&mut self, _ctx: &mut StrategyContext<'_>) {}
}

/// Produces a fresh, independent strategy instance from a parameter map.
/// Consumed by the Optimizer and Walk-Forward analyzer (spec §6).
pub trait StrategyFactory {
    fn create(&self, params: &HashMap<String, f64>) -> Result<Box<dyn Strategy>, String>;
}

impl<F> StrategyFactory for F
where
    F: Fn(&HashMap<String, f64>) -> Result<Box<dyn Strategy>, String>,
{
    fn create(&self, params: &HashMap<String, f64>) -> Result<Box<dyn Strategy>, String> {
        (self)(params)
    }
}

/// Always-flat strategy that never emits a signal. Used by scenario S1 and as
/// a baseline in tests.
#[derive(Default)]
pub struct NoSignalStrategy;

impl Strategy for NoSignalStrategy {
    fn on_market_data(&mut self, _ctx: &mut StrategyContext<'_>, _event: &MarketDataEvent) {}
}

/// Buys the full allowed position on the first bar and holds to the end,
/// where the Engine's force-close flattens it.
pub struct BuyAndHoldStrategy {
    quantity: f64,
    bought: bool,
}

impl BuyAndHoldStrategy {
    pub fn new(quantity: f64) -> Self {
        Self {
            quantity,
            bought: false,
        }
    }
}

impl Strategy for BuyAndHoldStrategy {
    fn on_market_data(&mut self, ctx: &mut StrategyContext<'_>, event: &MarketDataEvent) {
        if !self.bought {
            ctx.emit(
                SignalAction::Buy,
                event.bar.close,
                self.quantity,
                "buy and hold entry",
                1.0,
            );
            self.bought = true;
        }
    }
}

/// Crosses a short and long simple moving average of closing prices. Goes
/// long on a bullish cross, flattens on a bearish cross.
pub struct MovingAverageCrossoverStrategy {
    short_window: usize,
    long_window: usize,
    quantity: f64,
    closes: Vec<f64>,
    in_position: bool,
}

impl MovingAverageCrossoverStrategy {
    pub fn new(short_window: usize, long_window: usize, quantity: f64) -> Self {
        assert!(
            short_window < long_window,
            "short_window must be less than long_window"
        );
        Self {
            short_window,
            long_window,
            quantity,
            closes: Vec::new(),
            in_position: false,
        }
    }

    fn sma(&self, window: usize) -> Option<f64> {
        if self.closes.len() < window {
            return None;
        }
        let start = self.closes.len() - window;
        Some(self.closes[start..].iter().sum::<f64>() / window as f64)
    }
}

impl Strategy for MovingAverageCrossoverStrategy {
    fn on_market_data(&mut self, ctx: &mut StrategyContext<'_>, event: &MarketDataEvent) {
        self.closes.push(event.bar.close);

        let (Some(short), Some(long)) = (self.sma(self.short_window), self.sma(self.long_window))
        else {
            return;
        };

        if short > long && !self.in_position {
            ctx.emit(
                SignalAction::Buy,
                event.bar.close,
                self.quantity,
                format!(
                    "sma{} crossed above sma{}",
                    self.short_window, self.long_window
                ),
                1.0,
            );
            self.in_position = true;
        } else if short < long && self.in_position {
            ctx.emit(
                SignalAction::Sell,
                event.bar.close,
                self.quantity,
                format!(
                    "sma{} crossed below sma{}",
                    self.short_window, self.long_window
                ),
                1.0,
            );
            self.in_position = false;
        }
    }
}

/// The closed set of strategy names the CLI exposes (spec §6).
pub fn build_strategy(name: &str, params: &HashMap<String, f64>) -> Result<Box<dyn Strategy>, String> {
    match name {
        "buy_and_hold" => {
            let quantity = *params.get("quantity").unwrap_or(&100.0);
            Ok(Box::new(BuyAndHoldStrategy::new(quantity)))
        }
        "sma_crossover" => {
            let short = *params.get("short_window").unwrap_or(&10.0) as usize;
            let long = *params.get("long_window").unwrap_or(&30.0) as usize;
            let quantity = *params.get("quantity").unwrap_or(&100.0);
            if short >= long {
                return Err(format!(
                    "short_window ({short}) must be less than long_window ({long})"
                ));
            }
            Ok(Box::new(MovingAverageCrossoverStrategy::new(
                short, long, quantity,
            )))
        }
        other => Err(format!("unknown strategy {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn md(close: f64) -> MarketDataEvent {
        MarketDataEvent {
            bar: crate::bar::Bar::new(Utc::now(), close, close, close, close, 1000.0),
        }
    }

    #[test]
    fn buy_and_hold_buys_once() {
        let mut bus = EventBus::default();
        let mut strat = BuyAndHoldStrategy::new(10.0);
        let mut ctx = StrategyContext::new("AAPL".into(), &mut bus);
        strat.on_market_data(&mut ctx, &md(100.0));
        strat.on_market_data(&mut ctx, &md(101.0));
        assert_eq!(bus.drain_signals().len(), 1);
    }

    #[test]
    fn no_signal_strategy_emits_nothing() {
        let mut bus = EventBus::default();
        let mut strat = NoSignalStrategy;
        let mut ctx = StrategyContext::new("AAPL".into(), &mut bus);
        for _ in 0..10 {
            strat.on_market_data(&mut ctx, &md(100.0));
        }
        assert!(bus.drain_signals().is_empty());
    }

    #[test]
    fn unknown_strategy_name_is_an_error() {
        assert!(build_strategy("nonexistent", &HashMap::new()).is_err());
    }
}
