//! Plain-text rendering of reports for the CLI

use crate::engine::SaleReceipt;
use crate::model::{Transaction, TransactionKind};
use crate::pricing::PriceRefresh;
use crate::report::{GainsSummary, InventoryReport};
use tcg_common::PriceObservation;

fn money(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string())
}

pub fn format_inventory(report: &InventoryReport) -> String {
    let mut output = format!(
        "Inventory for {} ({})\n",
        report.user.display_name, report.user.username
    );

    if report.lines.is_empty() {
        output.push_str("No cards in inventory.\n");
        return output;
    }

    let rows: Vec<[String; 8]> = report
        .lines
        .iter()
        .map(|line| {
            [
                line.holding.quantity.to_string(),
                line.card.name.clone(),
                line.card.set_name.clone(),
                line.card.condition.clone(),
                format!("{:.2}", line.holding.cost_basis),
                money(line.holding.average_cost()),
                money(line.card.last_price.map(|o| o.price)),
                money(line.unrealized_gain()),
            ]
        })
        .collect();
    let header = [
        "Qty", "Name", "Set", "Cond", "Cost", "Avg", "Last", "Unrealized",
    ];
    // Numbers right-aligned, text left-aligned
    let right = [true, false, false, false, true, true, true, true];
    write_table(&mut output, &header, &rows, &right);

    output.push_str(&format!(
        "\nTotal: {} cards, cost basis {:.2}, market value {:.2}",
        report.total_quantity(),
        report.total_cost_basis(),
        report.total_market_value()
    ));
    match report.unpriced_lines() {
        0 => output.push('\n'),
        n => output.push_str(&format!(" ({n} without price)\n")),
    }
    output
}

pub fn format_history(transactions: &[Transaction]) -> String {
    if transactions.is_empty() {
        return "No transactions found.\n".to_string();
    }

    let rows: Vec<[String; 8]> = transactions
        .iter()
        .map(|t| {
            [
                t.id.to_string(),
                t.created_at.format("%Y-%m-%d %H:%M").to_string(),
                t.kind.to_string(),
                t.card_id.to_string(),
                t.quantity.to_string(),
                money(t.unit_price),
                t.from_user.clone().unwrap_or_else(|| "-".to_string()),
                t.to_user.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    let header = ["#", "Date", "Kind", "Card", "Qty", "Price", "From", "To"];
    let right = [true, false, false, false, true, true, false, false];

    let mut output = String::new();
    write_table(&mut output, &header, &rows, &right);
    output
}

pub fn format_gains(summary: &GainsSummary) -> String {
    let mut output = format!("Realized gains for {}\n", summary.username);
    if summary.sales.is_empty() {
        output.push_str("No sales recorded.\n");
        return output;
    }

    let rows: Vec<[String; 6]> = summary
        .sales
        .iter()
        .map(|t| {
            [
                t.created_at.format("%Y-%m-%d").to_string(),
                t.card_id.to_string(),
                t.quantity.to_string(),
                money(t.proceeds()),
                format!("{:.2}", t.cost_basis),
                money(t.realized_gain()),
            ]
        })
        .collect();
    let header = ["Date", "Card", "Qty", "Proceeds", "Cost", "Gain"];
    let right = [false, false, true, true, true, true];
    write_table(&mut output, &header, &rows, &right);

    output.push_str(&format!(
        "\n{} sold, proceeds {:.2}, cost {:.2}, realized gain {:.2}\n",
        summary.units_sold(),
        summary.proceeds,
        summary.cost_removed,
        summary.realized_gain()
    ));
    output
}

pub fn format_transaction(transaction: &Transaction) -> String {
    let parties = match transaction.kind {
        TransactionKind::Purchase => format!(
            "bought by {}",
            transaction.to_user.as_deref().unwrap_or("-")
        ),
        TransactionKind::Sale => format!(
            "sold by {}",
            transaction.from_user.as_deref().unwrap_or("-")
        ),
        TransactionKind::Transfer => format!(
            "{} -> {}",
            transaction.from_user.as_deref().unwrap_or("-"),
            transaction.to_user.as_deref().unwrap_or("-")
        ),
    };
    let price = transaction
        .unit_price
        .map(|p| format!(" @ {p:.2}"))
        .unwrap_or_default();
    format!(
        "#{} {} {} x {}{}, {}\n",
        transaction.id,
        transaction.kind,
        transaction.quantity,
        transaction.card_id,
        price,
        parties
    )
}

pub fn format_receipt(receipt: &SaleReceipt) -> String {
    format!(
        "{}  proceeds {:.2}, cost removed {:.2}, realized gain {:.2}\n",
        format_transaction(&receipt.transaction),
        receipt.proceeds,
        receipt.cost_removed,
        receipt.realized_gain
    )
}

pub fn format_price(query: &str, observation: Option<&PriceObservation>) -> String {
    match observation {
        Some(obs) => format!(
            "Last sold price for '{}': {:.2} (observed {})\n",
            query,
            obs.price,
            obs.observed_at.format("%Y-%m-%d %H:%M")
        ),
        None => format!("No sold listings found for '{query}'.\n"),
    }
}

pub fn format_refresh(card: &str, refresh: &PriceRefresh) -> String {
    match refresh {
        PriceRefresh::Accepted(obs) => format!("Price for {card} updated to {:.2}\n", obs.price),
        PriceRefresh::Stale(current) => {
            format!("Price for {card} unchanged at {:.2}\n", current.price)
        }
        PriceRefresh::NoResult => format!("No sold listings found for {card}.\n"),
        PriceRefresh::Unavailable(unavailable) => format!("WARNING: {unavailable}\n"),
    }
}

fn write_table<const N: usize>(
    output: &mut String,
    header: &[&str; N],
    rows: &[[String; N]],
    right_align: &[bool; N],
) {
    let mut widths = header.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render = |cells: Vec<&str>| {
        let line = cells
            .iter()
            .zip(widths.iter().zip(right_align))
            .map(|(cell, (&width, &right))| {
                if right {
                    format!("{cell:>width$}")
                } else {
                    format!("{cell:<width$}")
                }
            })
            .collect::<Vec<_>>()
            .join(" | ");
        format!("{}\n", line.trim_end())
    };

    output.push_str(&render(header.to_vec()));
    let rule_len = widths.iter().sum::<usize>() + 3 * N.saturating_sub(1);
    output.push_str(&"-".repeat(rule_len));
    output.push('\n');
    for row in rows {
        output.push_str(&render(row.iter().map(String::as_str).collect()));
    }
}
