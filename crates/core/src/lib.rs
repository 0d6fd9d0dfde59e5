pub mod check;
pub mod money;
pub mod recurrence;

pub use check::{CheckStatus, ReceiptCheck};
pub use money::{money_str, parse_amount, qty_str, round_money};
pub use recurrence::{
    next_occurrence, RecurrencePeriod, Subscription, Transaction, MAX_CATCHUP_RUNS,
};
