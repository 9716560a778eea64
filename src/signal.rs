use crate::models::{Asset, AssetSignal, RiskSettings, SignalAction};

/// Prices in API payloads are rounded to cents.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Assembles the per-asset signal block: entry at the live price, the
/// take-profit above and the stop-loss below it by the configured
/// percentages.
pub fn build_asset_signal(
    asset: Asset,
    price: f64,
    action: SignalAction,
    settings: &RiskSettings,
) -> AssetSignal {
    let tp_percentage = settings.tp_percentage(asset);
    let sl_percentage = settings.sl_percentage(asset);
    AssetSignal {
        price: Some(round2(price)),
        entry: Some(round2(price)),
        take_profit: Some(round2(price * (1.0 + tp_percentage / 100.0))),
        stop_loss: Some(round2(price * (1.0 - sl_percentage / 100.0))),
        signal_type: action.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_follow_configured_percentages() {
        let settings = RiskSettings::default();
        let signal = build_asset_signal(Asset::Bitcoin, 65000.0, SignalAction::Buy, &settings);
        assert_eq!(signal.price, Some(65000.0));
        assert_eq!(signal.entry, Some(65000.0));
        // Defaults: 2.5% TP, 1.5% SL.
        assert_eq!(signal.take_profit, Some(66625.0));
        assert_eq!(signal.stop_loss, Some(64025.0));
        assert_eq!(signal.signal_type, "buy");
    }

    #[test]
    fn gold_uses_its_own_percentages() {
        let settings = RiskSettings::default();
        let signal = build_asset_signal(Asset::Gold, 2000.0, SignalAction::Sell, &settings);
        assert_eq!(signal.take_profit, Some(2036.0));
        assert_eq!(signal.stop_loss, Some(1984.0));
        assert_eq!(signal.signal_type, "sell");
    }

    #[test]
    fn values_are_rounded_to_cents() {
        let settings = RiskSettings::default();
        let signal = build_asset_signal(Asset::Bitcoin, 64999.987, SignalAction::Buy, &settings);
        assert_eq!(signal.price, Some(64999.99));
    }
}
