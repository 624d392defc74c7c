use crate::value::Value;

/// The non-local transfer produced by executing a statement. `return`,
/// `break`, and `continue` each propagate one of these up through nested
/// blocks and loops instead of unwinding through `Result::Err`, so a
/// runtime error and an ordinary loop exit never share a channel.
pub enum ControlFlow {
    Normal,
    Break,
    Continue,
    Return(Value),
}
