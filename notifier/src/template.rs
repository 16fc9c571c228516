// notifier/src/template.rs
//! Renders the single email template spec.md §4.5 step 3 mandates: code,
//! name, current price, target price, direction, timestamp. One template,
//! no branding — the out-of-scope "production SMTP account" note in
//! SPEC_FULL.md applies here.

use shared_models::{AlertDirection, AlertEvent};

fn direction_label(direction: AlertDirection) -> &'static str {
    match direction {
        AlertDirection::StopLoss => "Stop Loss",
        AlertDirection::TakeProfit => "Take Profit",
    }
}

pub fn subject(event: &AlertEvent) -> String {
    format!(
        "[Trade Journal] {} alert: {}",
        direction_label(event.direction),
        event.instrument_name.as_deref().unwrap_or(&event.instrument_code)
    )
}

pub fn html_body(event: &AlertEvent) -> String {
    let name = event.instrument_name.as_deref().unwrap_or(&event.instrument_code);
    format!(
        "<h2>{label} triggered for {name} ({code})</h2>\
         <p>Current price: <strong>{price:.2}</strong></p>\
         <p>Target price: <strong>{target:.2}</strong></p>\
         <p>Time: {timestamp}</p>",
        label = direction_label(event.direction),
        name = name,
        code = event.instrument_code,
        price = event.price,
        target = event.target,
        timestamp = event.occurred_at.to_rfc3339(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared_models::AlertDirection;

    fn event() -> AlertEvent {
        AlertEvent {
            user_id: 1,
            strategy_id: 1,
            trade_id: 1,
            instrument_code: "600000".into(),
            instrument_name: Some("Pudong Development Bank".into()),
            direction: AlertDirection::StopLoss,
            price: 9.7,
            target: 10.0,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn subject_names_the_instrument() {
        assert!(subject(&event()).contains("Pudong Development Bank"));
    }

    #[test]
    fn body_carries_price_and_target() {
        let body = html_body(&event());
        assert!(body.contains("9.70"));
        assert!(body.contains("10.00"));
    }
}
