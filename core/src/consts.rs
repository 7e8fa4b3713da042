/// Magic bytes that open every CompactAST binary document.
pub const COMPACT_AST_MAGIC: [u8; 4] = *b"ASTP";

/// The CompactAST format version this decoder/encoder implements.
pub const COMPACT_AST_VERSION: u16 = 1;

/// Default cap on loop-construct iterations, applied per §4.3. Kept small so
/// hosted test runs terminate quickly; hosts that need real program behaviour
/// should raise this via [`crate::options::InterpreterOptions`].
pub const DEFAULT_MAX_LOOP_ITERATIONS: u32 = 3;

/// Default deadline for an in-flight asynchronous external-value request.
pub const DEFAULT_EXTERNAL_VALUE_TIMEOUT_MS: u32 = 5000;

/// Sentinel returned for an external value read that could not be satisfied
/// (no provider configured, or a timed-out async request).
pub const EXTERNAL_VALUE_SENTINEL: i32 = -1;

/// Interpreter component name reported in `VERSION_INFO`.
pub const COMPONENT_NAME: &str = "interpreter";

/// Interpreter semantic version reported in `VERSION_INFO`.
pub const INTERPRETER_VERSION: &str = env!("CARGO_PKG_VERSION");
