//! Order pricing. Each line is priced exactly once against the current
//! ingredient price; the resulting `PricedLine` feeds both the order
//! total and the persisted order_items snapshot.

#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub ingredient_id: i64,
    pub quantity: f64,
    pub unit_price: f64,
    pub subtotal: f64,
}

pub fn price_line(ingredient_id: i64, unit_price: f64, quantity: f64) -> PricedLine {
    PricedLine {
        ingredient_id,
        quantity,
        unit_price,
        subtotal: unit_price * quantity,
    }
}

pub fn order_total(lines: &[PricedLine]) -> f64 {
    lines.iter().map(|line| line.subtotal).sum()
}
