//! Rule evaluation engine.
//!
//! A run flows through:
//! 1. `loader::load_rules()` — JSON rule source → validated `Rule`s
//! 2. `MessageView::extract()` — field lookup per message representation
//! 3. `Condition::evaluate()` — string and date predicates
//! 4. `RulesEngine::applies()` / `resolve()` — aggregation and actions
//! 5. `RulesEngine::run()` — dispatch through an `ActionDispatcher`

pub mod condition;
pub mod engine;
pub mod field;
pub mod loader;
pub mod model;

pub use condition::parse_message_date;
pub use engine::{ActionDispatcher, DispatchFailure, RulesEngine, RunReport};
pub use field::{Envelope, MessageView};
pub use loader::{load_rules, parse_rules};
pub use model::{
    Action, AgeUnit, Aggregate, Condition, DatePredicate, Field, Rule, StringPredicate, TextField,
};
