//! Stub server operations and their URL paths

use std::fmt;

/// Operations exposed by the stub server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Delete every stub of a scenario
    DeleteStubs,
    /// Start a record or playback session
    BeginSession,
    /// End a session
    EndSession,
    /// Store one stub in a recording session
    PutStub,
    /// Look up the stored response for a request
    GetResponse,
    /// Server, scenario or session status
    GetStatus,
    /// List the stubs of a scenario
    GetStublist,
    /// Export a scenario
    GetExport,
    /// Execute a command file
    ExecCmds,
    /// Read a delay policy
    GetDelayPolicy,
    /// Create or replace a delay policy
    PutDelayPolicy,
    /// Delete a delay policy
    DeleteDelayPolicy,
}

impl Operation {
    /// Every known operation
    pub const ALL: [Operation; 12] = [
        Operation::DeleteStubs,
        Operation::BeginSession,
        Operation::EndSession,
        Operation::PutStub,
        Operation::GetResponse,
        Operation::GetStatus,
        Operation::GetStublist,
        Operation::GetExport,
        Operation::ExecCmds,
        Operation::GetDelayPolicy,
        Operation::PutDelayPolicy,
        Operation::DeleteDelayPolicy,
    ];

    /// Operation name as used by the server API
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Operation::DeleteStubs => "delete_stubs",
            Operation::BeginSession => "begin_session",
            Operation::EndSession => "end_session",
            Operation::PutStub => "put_stub",
            Operation::GetResponse => "get_response",
            Operation::GetStatus => "get_status",
            Operation::GetStublist => "get_stublist",
            Operation::GetExport => "get_export",
            Operation::ExecCmds => "exec_cmds",
            Operation::GetDelayPolicy => "get_delay_policy",
            Operation::PutDelayPolicy => "put_delay_policy",
            Operation::DeleteDelayPolicy => "delete_delay_policy",
        }
    }

    /// URL path relative to the API prefix
    #[must_use]
    pub fn path(self) -> String {
        method_to_path(self.name())
    }

    /// Look up an operation by name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Map `word_rest_of_name` to `word/rest_of_name`
///
/// A name without an underscore maps to `name/`.
#[must_use]
pub fn method_to_path(name: &str) -> String {
    match name.split_once('_') {
        Some((head, rest)) => format!("{head}/{rest}"),
        None => format!("{name}/"),
    }
}
