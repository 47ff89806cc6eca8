pub use synthesize_test_utils::{init_tracing, with_timeout};
