use std::path::PathBuf;
use thiserror::Error;

/// Errors caused by the command line given by the user. They are never retried:
/// the invocation stops and the process exits with a failure code.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("Please provide an operation:\n{usage}")]
    MissingOperation { usage: String },

    #[error("Incorrect operation '{operation}'. Please use 'help' to see the available operations.")]
    UnknownOperation { operation: String },

    #[error("Flag {flag} not found. Please use 'help' to see the available flags.")]
    UnknownFlag { flag: String },

    #[error("Topic {topic} not found. Please use 'help' to see the available flags and operations.")]
    UnknownHelpTopic { topic: String },

    #[error("Missing the argument for {flag}. Please use 'help' to see the available flags.")]
    MissingArgument { flag: String },

    #[error(
        "Did you forget to specify the argument for {flag}? Got: '{argument}'.\n\
        Please use 'help' to see the available flags."
    )]
    ArgumentLooksLikeFlag { flag: String, argument: String },

    #[error("The output name '{name}' must be a file name, not a path")]
    InvalidOutputName { name: String },

    #[error("You did not create the directory '{}'. Aborting operation.", .directory.display())]
    DirectoryCreationDeclined { directory: PathBuf },
}
