use std::sync::Arc;

use thiserror::Error;

use crate::world::EntityId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptProgram {
    pub res_ref: String,
}

impl ScriptProgram {
    pub fn new(res_ref: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            res_ref: res_ref.into(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    pub caller_id: Option<EntityId>,
    pub triggerer_id: Option<EntityId>,
    pub user_defined_event_number: i32,
}

/// A script program plus the context it was captured with. The caller id is
/// rebound to the acting creature when the invocation runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptInvocation {
    pub program: Arc<ScriptProgram>,
    pub context: ExecutionContext,
}

impl ScriptInvocation {
    pub fn new(program: Arc<ScriptProgram>, context: ExecutionContext) -> Self {
        Self { program, context }
    }

    pub(crate) fn context_for(&self, caller_id: EntityId) -> ExecutionContext {
        ExecutionContext {
            caller_id: Some(caller_id),
            ..self.context
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("script program '{res_ref}' not found")]
    ProgramNotFound { res_ref: String },
    #[error("script '{res_ref}' aborted at instruction {offset}: {reason}")]
    Aborted {
        res_ref: String,
        offset: u32,
        reason: String,
    },
    #[error("script '{res_ref}' called unknown routine {routine}")]
    UnknownRoutine { res_ref: String, routine: u32 },
}

pub trait ScriptRunner {
    fn run(&self, program: &ScriptProgram, context: ExecutionContext) -> Result<i32, ScriptError>;
}

/// Runner used when no scripting backend is wired; every program is missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullScriptRunner;

impl ScriptRunner for NullScriptRunner {
    fn run(&self, program: &ScriptProgram, _context: ExecutionContext) -> Result<i32, ScriptError> {
        Err(ScriptError::ProgramNotFound {
            res_ref: program.res_ref.clone(),
        })
    }
}
