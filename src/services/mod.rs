pub mod costing;
pub mod movement;
pub mod stock_ledger;
