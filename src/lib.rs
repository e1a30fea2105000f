//! Tiered token pricing for LLM gateway billing.
//!
//! The [`core`] module holds the pricing engine: the tier configuration model,
//! rule matching, ratio/price conversion and quota calculation. The
//! `tierprice` binary layers a terminal front end over it.

pub mod core;
