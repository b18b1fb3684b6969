use std::collections::VecDeque;

use tracing::warn;

use crate::bar::Bar;

/// Action a strategy asks the executor to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Buy,
    Sell,
}

/// A trading signal emitted by a strategy on the `Signal` topic.
#[derive(Debug, Clone)]
pub struct SignalEvent {
    pub symbol: String,
    pub action: SignalAction,
    pub price: f64,
    pub quantity: f64,
    pub reason: String,
    pub confidence: f64,
}

/// One bar delivered on the `MarketData` topic.
#[derive(Debug, Clone, Copy)]
pub struct MarketDataEvent {
    pub bar: Bar,
}

/// Per-run bound on how many unconsumed events a topic queue may hold before
/// `publish` starts dropping. The engine drains every publish synchronously
/// before advancing (spec §4.1), so in practice a queue never holds more than
/// what a single strategy callback just produced; the cap exists to bound a
/// misbehaving strategy that emits an unbounded number of signals off one bar.
const DEFAULT_CAPACITY: usize = 256;

/// A minimal typed pub/sub bus scoped to one backtest run.
///
/// Scheduling is single-threaded and cooperative (spec §4.1, §5): the Engine
/// is the only publisher of `MarketDataEvent` and the only consumer of
/// `SignalEvent`. We choose **drop-with-warning** over synchronous
/// back-pressure for the bounded-queue policy: a full queue means a
/// strategy produced more signals off one bar than any reasonable position
/// sizing would need, so dropping the excess (and logging it) keeps the run
/// moving rather than stalling it.
pub struct EventBus {
    market_data: VecDeque<MarketDataEvent>,
    signals: VecDeque<SignalEvent>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            market_data: VecDeque::new(),
            signals: VecDeque::new(),
            capacity,
        }
    }

    pub fn publish_market_data(&mut self, event: MarketDataEvent) {
        if self.market_data.len() >= self.capacity {
            warn!("market data queue full, dropping oldest event");
            self.market_data.pop_front();
        }
        self.market_data.push_back(event);
    }

    pub fn publish_signal(&mut self, event: SignalEvent) {
        if self.signals.len() >= self.capacity {
            warn!(symbol = %event.symbol, "signal queue full, dropping signal");
            return;
        }
        self.signals.push_back(event);
    }

    pub fn next_market_data(&mut self) -> Option<MarketDataEvent> {
        self.market_data.pop_front()
    }

    /// Drains every pending signal in publish order. Called synchronously by
    /// the Engine after each `MarketDataEvent` it publishes (spec §4.1).
    pub fn drain_signals(&mut self) -> Vec<SignalEvent> {
        self.signals.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bar() -> Bar {
        Bar::new(Utc::now(), 1.0, 1.0, 1.0, 1.0, 1.0)
    }

    #[test]
    fn signals_drain_in_publish_order() {
        let mut bus = EventBus::default();
        bus.publish_signal(SignalEvent {
            symbol: "A".into(),
            action: SignalAction::Buy,
            price: 1.0,
            quantity: 1.0,
            reason: "first".into(),
            confidence: 1.0,
        });
        bus.publish_signal(SignalEvent {
            symbol: "A".into(),
            action: SignalAction::Sell,
            price: 1.0,
            quantity: 1.0,
            reason: "second".into(),
            confidence: 1.0,
        });
        let drained = bus.drain_signals();
        assert_eq!(drained[0].reason, "first");
        assert_eq!(drained[1].reason, "second");
        assert!(bus.drain_signals().is_empty());
    }

    #[test]
    fn drop_with_warning_when_signal_queue_full() {
        let mut bus = EventBus::new(1);
        bus.publish_signal(SignalEvent {
            symbol: "A".into(),
            action: SignalAction::Buy,
            price: 1.0,
            quantity: 1.0,
            reason: "kept".into(),
            confidence: 1.0,
        });
        bus.publish_signal(SignalEvent {
            symbol: "A".into(),
            action: SignalAction::Buy,
            price: 1.0,
            quantity: 1.0,
            reason: "dropped".into(),
            confidence: 1.0,
        });
        let drained = bus.drain_signals();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].reason, "kept");
    }

    #[test]
    fn market_data_is_fifo() {
        let mut bus = EventBus::default();
        bus.publish_market_data(MarketDataEvent { bar: bar() });
        assert!(bus.next_market_data().is_some());
        assert!(bus.next_market_data().is_none());
    }
}
