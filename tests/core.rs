#[path = "core/alignment_scenario.rs"]
mod alignment_scenario;
#[path = "core/history_cap.rs"]
mod history_cap;
#[path = "core/history_round_trip.rs"]
mod history_round_trip;
#[path = "core/ledger_recovery.rs"]
mod ledger_recovery;
#[path = "core/protocol_flow.rs"]
mod protocol_flow;
