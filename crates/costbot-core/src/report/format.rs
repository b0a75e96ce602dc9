//! Slack-flavoured text rendering of an [`AggregateReport`]. Pure; every input renders.

use super::{AggregateReport, ExchangeRate};

/// Rendered in place of the category list when nothing was spent.
pub const NO_SPEND_SENTINEL: &str = "No costs incurred in this period 📉";

/// Two decimals, no grouping.
pub fn money(value: f64) -> String {
    format!("{:.2}", value)
}

/// Two decimals with `,` between thousands groups: `12750.5` -> `12,750.50`.
pub fn group_thousands(value: f64) -> String {
    let fixed = money(value);
    let (sign, digits) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, "00"));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}{}.{}", sign, grouped, frac_part)
}

/// Render the report. Section order: title, window breakdown, per-category lines (or the
/// no-spend sentinel), running total, summary. Only the summary groups thousands.
pub fn format_report(report: &AggregateReport, rate: &ExchangeRate) -> String {
    let days = report.days();
    let total = report.total_usd;
    let average = report.daily_average();

    let mut message = String::from("📊 *AWS COST REPORT*\n\n");
    message.push_str(&format!("*📅 {}-DAY COST BREAKDOWN*\n", days));
    message.push_str(&format!(
        "_{} - {}_\n\n",
        report.period_start, report.period_end
    ));

    if report.is_empty() {
        message.push_str(NO_SPEND_SENTINEL);
        message.push('\n');
    } else {
        for record in &report.by_category {
            message.push_str(&format!(
                "▹ {} - ${} (₹{})\n",
                record.category,
                money(record.amount),
                money(rate.convert(record.amount))
            ));
        }
    }

    message.push_str(&format!(
        "\n*Total:* ${} (₹{})\n\n",
        money(total),
        money(rate.convert(total))
    ));

    message.push_str("*📌 SUMMARY*\n");
    message.push_str(&format!(
        "▹ *Last {} Days Total* - ${} (₹{})\n",
        days,
        group_thousands(total),
        group_thousands(rate.convert(total))
    ));
    message.push_str(&format!(
        "▹ *Daily Average Cost* - ${} (₹{})",
        group_thousands(average),
        group_thousands(rate.convert(average))
    ));
    message
}
