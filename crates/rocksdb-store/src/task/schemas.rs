use synccommittee_primitives::{ids::TaskId, task::TaskEntry};

use crate::{define_table_with_default_codec, define_table_without_codec, impl_borsh_value_codec};

define_table_with_default_codec!(
    /// Tasks that are waiting, running or waiting to be retried
    (TaskEntrySchema, "task_entries") TaskId => TaskEntry
);

define_table_with_default_codec!(
    /// Tasks that failed with a non-retryable error, kept until their batch is reset
    (FailedTaskEntrySchema, "failed_task_entries") TaskId => TaskEntry
);
