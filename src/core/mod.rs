//! 核心基础：错误类型、时钟与休眠注入

pub mod clock;
pub mod error;

pub use clock::{Clock, ManualClock, RecordingSleeper, Sleeper, SystemClock, TokioSleeper};
pub use error::{AgentError, AgentResult};
