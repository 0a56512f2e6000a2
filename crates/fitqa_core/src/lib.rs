pub mod domain;
pub mod error;
pub mod memory;
pub mod ports;
pub mod store;

pub use domain::{
    AuthEvent, AuthUser, CalorieEntry, ChangeEvent, ChangeFilter, ChangeKind, DailyCalories,
    MonthlyAverage, NewQuestion, Question, Session, Settings, Stats, Table, VoteKind, VoteRow,
};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryLocalStore;
pub use ports::{
    AnswerService, AuthService, ChangeStream, Clock, LocalStore, PortError, PortResult,
    RemoteDataService, SystemClock,
};
pub use store::{AppStore, StorePorts, SyncHandle, VoteOutcome};
