//! Take-profit and stop-loss derivation.

use cryptopulse_core::{targets_are_ordered, SignalType, TargetConfig};

/// Take-profit / stop-loss pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Targets {
    pub take_profit: f64,
    pub stop_loss: f64,
}

/// TP and SL distances in percent after reputation and volatility scaling.
#[must_use]
pub fn distances(config: &TargetConfig, reputation_score: f64, range_pct: f64) -> (f64, f64) {
    let mut scale = 1.0;
    if reputation_score > config.high_reputation {
        scale *= 1.0 + config.reputation_adjustment;
    } else if reputation_score < config.low_reputation {
        scale *= 1.0 - config.reputation_adjustment;
    }
    if range_pct > config.volatility_range_pct {
        scale *= 1.0 + config.volatility_adjustment;
    }
    (config.take_profit_pct * scale, config.stop_loss_pct * scale)
}

/// Places targets on the correct side of `entry` for the direction.
#[must_use]
pub fn place(signal_type: SignalType, entry: f64, tp_pct: f64, sl_pct: f64) -> Targets {
    match signal_type {
        SignalType::Buy => Targets {
            take_profit: entry * (1.0 + tp_pct / 100.0),
            stop_loss: entry * (1.0 - sl_pct / 100.0),
        },
        SignalType::Sell => Targets {
            take_profit: entry * (1.0 - tp_pct / 100.0),
            stop_loss: entry * (1.0 + sl_pct / 100.0),
        },
        SignalType::Wait => Targets {
            take_profit: entry,
            stop_loss: entry,
        },
    }
}

/// Derives targets for a directional candidate.
#[must_use]
pub fn derive(
    config: &TargetConfig,
    signal_type: SignalType,
    entry: f64,
    reputation_score: f64,
    range_pct: f64,
) -> Targets {
    let (tp_pct, sl_pct) = distances(config, reputation_score, range_pct);
    place(signal_type, entry, tp_pct, sl_pct)
}

/// Repairs targets that violate the direction invariant.
///
/// TP is nudged to the minimum offset from entry and SL reset to `sl_pct`.
/// Returns the repaired targets and whether anything changed.
#[must_use]
pub fn enforce(
    config: &TargetConfig,
    signal_type: SignalType,
    entry: f64,
    targets: Targets,
    sl_pct: f64,
) -> (Targets, bool) {
    if !signal_type.is_directional()
        || (targets.take_profit != entry
            && targets_are_ordered(signal_type, entry, targets.take_profit, targets.stop_loss))
    {
        return (targets, false);
    }

    let sl_pct = if sl_pct > 0.0 {
        sl_pct
    } else {
        config.min_tp_offset_pct
    };
    (place(signal_type, entry, config.min_tp_offset_pct, sl_pct), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_base_targets() {
        let config = TargetConfig::default();
        let buy = derive(&config, SignalType::Buy, 100.0, 60.0, 2.0);
        assert!(close(buy.take_profit, 102.0));
        assert!(close(buy.stop_loss, 99.0));

        let sell = derive(&config, SignalType::Sell, 100.0, 60.0, 2.0);
        assert!(close(sell.take_profit, 98.0));
        assert!(close(sell.stop_loss, 101.0));
    }

    #[test]
    fn test_high_reputation_widens() {
        let config = TargetConfig::default();
        let t = derive(&config, SignalType::Buy, 100.0, 80.0, 1.0);
        assert!(close(t.take_profit, 102.4));
        assert!(close(t.stop_loss, 98.8));
    }

    #[test]
    fn test_low_reputation_tightens() {
        let config = TargetConfig::default();
        let t = derive(&config, SignalType::Buy, 100.0, 40.0, 1.0);
        assert!(close(t.take_profit, 101.6));
        assert!(close(t.stop_loss, 99.2));
    }

    #[test]
    fn test_volatility_widens_further() {
        let config = TargetConfig::default();
        let (tp, sl) = distances(&config, 80.0, 6.0);
        assert!(close(tp, 3.0));
        assert!(close(sl, 1.5));
    }

    #[test]
    fn test_reputation_boundaries_unchanged() {
        let config = TargetConfig::default();
        assert_eq!(distances(&config, 70.0, 5.0), (2.0, 1.0));
        assert_eq!(distances(&config, 50.0, 0.0), (2.0, 1.0));
    }

    #[test]
    fn test_enforce_keeps_valid_targets() {
        let config = TargetConfig::default();
        let targets = Targets {
            take_profit: 105.0,
            stop_loss: 97.0,
        };
        let (kept, corrected) = enforce(&config, SignalType::Buy, 100.0, targets, 1.0);
        assert!(!corrected);
        assert_eq!(kept, targets);
    }

    #[test]
    fn test_enforce_repairs_inverted_sell() {
        let config = TargetConfig::default();
        let inverted = Targets {
            take_profit: 103.0,
            stop_loss: 97.0,
        };
        let (fixed, corrected) = enforce(&config, SignalType::Sell, 100.0, inverted, 1.0);

        assert!(corrected);
        assert!(close(fixed.take_profit, 99.5));
        assert!(close(fixed.stop_loss, 101.0));
    }

    #[test]
    fn test_enforce_repairs_tp_at_entry() {
        let config = TargetConfig::default();
        let flat = Targets {
            take_profit: 100.0,
            stop_loss: 99.0,
        };
        let (fixed, corrected) = enforce(&config, SignalType::Buy, 100.0, flat, 0.0);

        assert!(corrected);
        assert!(targets_are_ordered(
            SignalType::Buy,
            100.0,
            fixed.take_profit,
            fixed.stop_loss
        ));
    }
}
