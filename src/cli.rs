use crate::error::UsageError;
use crate::prompt::DirectoryPrompt;
use crate::{
    DEFAULT_IMAGES_OUTPUT_NAME, DEFAULT_PDFS_OUTPUT_NAME, merge_images_to_pdf,
    merge_pdfs_in_directory,
};
use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

pub const HELP_COMMAND: &str = "help";
const HELP_DESCRIPTION: &str =
    "prints this message or prints further information about a certain flag or command";
const CURRENT_DIRECTORY: &str = "./";
const PDF_SUFFIX: &str = ".pdf";

const HELP_MESSAGE: &str = "
makePDF: merge a directory of images or PDFs into a single PDF file
------------------------------------------------------------------

Operations:
-----------

img -in <input_directory> -out <output_directory> -name <output_filename>
    Merge images in the input directory into a single PDF file.
    Default output name: 'merged_images.pdf'.

pdf -in <input_directory> -out <output_directory> -name <output_filename>
    Merge PDFs in the input directory into a single PDF file.
    Default output name: 'merged.pdf'.

help <command or flag>
    Print this message or further information about a specific command or flag.
    Example: help -in

Arguments:
----------

-in, --input <input_directory>
    Specify the input directory containing the files to merge. Default is the current directory.

-out, --output <output_directory>
    Specify the output directory where the merged PDF file is saved. Default is the current directory.

-name <output_filename>
    Specify the name of the output PDF file, '.pdf' is appended when missing.
    Default is 'merged_images.pdf' for images and 'merged.pdf' for PDFs.

Example usage:
--------------

Merge images:
    makePDF img -in /path/to/images -out /path/to/output -name album

Merge PDFs:
    makePDF pdf -in /path/to/pdfs -out /path/to/output -name merged.pdf

Get help:
    makePDF help
    makePDF help -in
";

/// What the argument of a flag stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagRole {
    InputDirectory,
    OutputDirectory,
    OutputName,
}

impl FlagRole {
    fn expects_directory(self) -> bool {
        !matches!(self, FlagRole::OutputName)
    }
}

#[derive(Debug, Clone)]
pub struct FlagSpec {
    pub token: &'static str,
    pub role: FlagRole,
    pub description: &'static str,
}

/// Known flags, in precedence order: when two flags share a role, the value of
/// the one declared first wins.
#[derive(Debug, Clone)]
pub struct FlagTable {
    specs: Vec<FlagSpec>,
}

impl FlagTable {
    pub fn new(specs: Vec<FlagSpec>) -> Self {
        Self { specs }
    }

    pub fn standard() -> Self {
        const INPUT: &str = "specifies the absolute path to the input directory \
            (where the images or PDFs are located)";
        const OUTPUT: &str = "specifies the absolute path to the output directory \
            (where the pdf will be generated)";

        let spec = |token, role, description| FlagSpec {
            token,
            role,
            description,
        };
        Self::new(vec![
            spec("-in", FlagRole::InputDirectory, INPUT),
            spec("--input", FlagRole::InputDirectory, INPUT),
            spec("-out", FlagRole::OutputDirectory, OUTPUT),
            spec("--output", FlagRole::OutputDirectory, OUTPUT),
            spec("-name", FlagRole::OutputName, "the name of the output file"),
        ])
    }

    pub fn get(&self, token: &str) -> Option<&FlagSpec> {
        self.specs.iter().find(|spec| spec.token == token)
    }

    /// An empty value counts as absent.
    fn resolve<'a>(&self, parsed: &'a ParsedFlags, role: FlagRole) -> Option<&'a str> {
        self.specs
            .iter()
            .filter(|spec| spec.role == role)
            .filter_map(|spec| parsed.get(spec.token).map(String::as_str))
            .find(|value| !value.is_empty())
    }
}

/// Flag token to argument, last occurrence wins.
pub type ParsedFlags = HashMap<&'static str, String>;

pub type MergeFn = Box<dyn Fn(&ResolvedParams) -> Result<PathBuf>>;

pub struct Operation {
    pub name: &'static str,
    pub description: &'static str,
    pub default_output_name: &'static str,
    merge: MergeFn,
}

impl Operation {
    pub fn new(
        name: &'static str,
        description: &'static str,
        default_output_name: &'static str,
        merge: impl Fn(&ResolvedParams) -> Result<PathBuf> + 'static,
    ) -> Self {
        Self {
            name,
            description,
            default_output_name,
            merge: Box::new(merge),
        }
    }

    pub fn merge(&self, params: &ResolvedParams) -> Result<PathBuf> {
        (self.merge)(params)
    }
}

pub struct OperationTable {
    operations: Vec<Operation>,
}

impl OperationTable {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub fn standard() -> Self {
        Self::new(vec![
            Operation::new(
                "img",
                "merge images in the input directory into a single PDF file",
                DEFAULT_IMAGES_OUTPUT_NAME,
                |params| {
                    merge_images_to_pdf(
                        &params.input_dir,
                        &params.output_dir,
                        Some(params.output_name.as_str()),
                    )
                },
            ),
            Operation::new(
                "pdf",
                "merge PDFs in the input directory into a single PDF file",
                DEFAULT_PDFS_OUTPUT_NAME,
                |params| {
                    merge_pdfs_in_directory(
                        &params.input_dir,
                        &params.output_dir,
                        Some(params.output_name.as_str()),
                    )
                },
            ),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|operation| operation.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParams {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub output_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    FullHelp,
    TopicHelp {
        topic: String,
        description: &'static str,
    },
    Merge {
        operation: &'static str,
        params: ResolvedParams,
    },
}

/// How tokens that are neither a known flag nor a flag argument are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownTokenPolicy {
    #[default]
    Reject,
    /// Legacy behaviour: the token is logged and ignored.
    Skip,
}

pub struct Dispatcher {
    flags: FlagTable,
    operations: OperationTable,
    unknown_tokens: UnknownTokenPolicy,
}

impl Dispatcher {
    pub fn new(flags: FlagTable, operations: OperationTable) -> Self {
        Self {
            flags,
            operations,
            unknown_tokens: UnknownTokenPolicy::default(),
        }
    }

    pub fn standard() -> Self {
        Self::new(FlagTable::standard(), OperationTable::standard())
    }

    pub fn with_unknown_token_policy(mut self, policy: UnknownTokenPolicy) -> Self {
        self.unknown_tokens = policy;
        self
    }

    /// Run a whole invocation and return the process exit code. Help and results
    /// are written to `out`, errors to `err`.
    pub fn run(
        &self,
        args: &[String],
        out: &mut impl Write,
        err: &mut impl Write,
        prompt: &mut impl DirectoryPrompt,
    ) -> i32 {
        match self.try_run(args, out, prompt) {
            Ok(()) => EXIT_SUCCESS,
            Err(error) => {
                debug!("Invocation failed: {error:?}");
                let _ = writeln!(err, "{error}");
                EXIT_FAILURE
            }
        }
    }

    pub fn try_run(
        &self,
        args: &[String],
        out: &mut impl Write,
        prompt: &mut impl DirectoryPrompt,
    ) -> Result<()> {
        match self.parse(args, prompt)? {
            Command::FullHelp => writeln!(out, "{}", self.help_message())?,
            Command::TopicHelp { topic, description } => writeln!(out, "{topic}: {description}")?,
            Command::Merge { operation, params } => {
                let operation = self
                    .operations
                    .get(operation)
                    .ok_or(anyhow!("The operation '{operation}' vanished from the table"))?;

                info!(
                    "Run '{}' from '{}' into '{}' as '{}'",
                    operation.name,
                    params.input_dir.display(),
                    params.output_dir.display(),
                    params.output_name
                );
                let output_path = operation.merge(&params)?;
                writeln!(out, "Output document saved as '{}'", output_path.display())?;
            }
        }

        Ok(())
    }

    /// Turn `args` (without the program name) into a command. Missing directories
    /// named by flags are created here if `prompt` agrees.
    pub fn parse(&self, args: &[String], prompt: &mut impl DirectoryPrompt) -> Result<Command> {
        let Some((first, rest)) = args.split_first() else {
            return Err(UsageError::MissingOperation {
                usage: self.usage_hint(),
            }
            .into());
        };

        if first == HELP_COMMAND {
            return self.parse_help(rest.first());
        }

        let operation = self
            .operations
            .get(first)
            .ok_or_else(|| UsageError::UnknownOperation {
                operation: first.clone(),
            })?;

        let parsed = self.map_flags(rest, prompt)?;
        let params = self.resolve(&parsed, operation);
        debug!("Resolved parameters: {params:?}");

        Ok(Command::Merge {
            operation: operation.name,
            params,
        })
    }

    fn parse_help(&self, topic: Option<&String>) -> Result<Command> {
        let Some(topic) = topic else {
            return Ok(Command::FullHelp);
        };

        let description = self
            .operations
            .get(topic)
            .map(|operation| operation.description)
            .or_else(|| (topic == HELP_COMMAND).then_some(HELP_DESCRIPTION))
            .or_else(|| self.flags.get(topic).map(|spec| spec.description))
            .ok_or_else(|| UsageError::UnknownHelpTopic {
                topic: topic.clone(),
            })?;

        Ok(Command::TopicHelp {
            topic: topic.clone(),
            description,
        })
    }

    fn map_flags(&self, tokens: &[String], prompt: &mut impl DirectoryPrompt) -> Result<ParsedFlags> {
        let mut parsed = ParsedFlags::new();
        let mut tokens = tokens.iter();

        while let Some(token) = tokens.next() {
            let Some(spec) = self.flags.get(token) else {
                match self.unknown_tokens {
                    UnknownTokenPolicy::Reject => {
                        return Err(UsageError::UnknownFlag {
                            flag: token.clone(),
                        }
                        .into());
                    }
                    UnknownTokenPolicy::Skip => {
                        warn!("Ignoring the unrecognised token '{token}'");
                        continue;
                    }
                }
            };

            let argument = tokens.next().ok_or_else(|| UsageError::MissingArgument {
                flag: spec.token.to_string(),
            })?;
            validate_flag_argument(spec, argument, prompt)?;

            if let Some(previous) = parsed.insert(spec.token, argument.clone()) {
                debug!("{} given twice, '{previous}' replaced by '{argument}'", spec.token);
            }
        }

        Ok(parsed)
    }

    fn resolve(&self, parsed: &ParsedFlags, operation: &Operation) -> ResolvedParams {
        let directory = |role| {
            PathBuf::from(
                self.flags
                    .resolve(parsed, role)
                    .unwrap_or(CURRENT_DIRECTORY),
            )
        };

        ResolvedParams {
            input_dir: directory(FlagRole::InputDirectory),
            output_dir: directory(FlagRole::OutputDirectory),
            output_name: self
                .flags
                .resolve(parsed, FlagRole::OutputName)
                .map(with_pdf_suffix)
                .unwrap_or_else(|| operation.default_output_name.to_string()),
        }
    }

    /// The short message printed when no operation is given.
    pub fn usage_hint(&self) -> String {
        self.operations
            .iter()
            .map(|operation| format!("{}: {}", operation.name, operation.description))
            .chain(std::iter::once(format!("{HELP_COMMAND}: {HELP_DESCRIPTION}")))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn help_message(&self) -> &'static str {
        HELP_MESSAGE
    }
}

fn validate_flag_argument(
    spec: &FlagSpec,
    argument: &str,
    prompt: &mut impl DirectoryPrompt,
) -> Result<()> {
    if argument.starts_with('-') {
        return Err(UsageError::ArgumentLooksLikeFlag {
            flag: spec.token.to_string(),
            argument: argument.to_string(),
        }
        .into());
    }

    if !spec.role.expects_directory() {
        if argument.contains(std::path::MAIN_SEPARATOR) || argument.contains('/') {
            return Err(UsageError::InvalidOutputName {
                name: argument.to_string(),
            }
            .into());
        }
        return Ok(());
    }

    let directory = Path::new(argument);
    if directory.is_dir() {
        return Ok(());
    }

    if !prompt.confirm_create(directory)? {
        return Err(UsageError::DirectoryCreationDeclined {
            directory: directory.to_path_buf(),
        }
        .into());
    }

    std::fs::create_dir_all(directory).map_err(|err| {
        anyhow!("Could not create the directory '{}': {err}", directory.display())
    })?;
    info!("Created the directory '{}'", directory.display());

    Ok(())
}

/// Append `.pdf` unless the name already ends with it.
pub fn with_pdf_suffix(name: &str) -> String {
    if name.ends_with(PDF_SUFFIX) {
        name.to_string()
    } else {
        format!("{name}{PDF_SUFFIX}")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils;
    use lopdf::Document;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|token| token.to_string()).collect()
    }

    fn never_asked(directory: &Path) -> bool {
        panic!("Unexpected prompt for '{}'", directory.display())
    }

    /// A dispatcher whose operations only record what they are called with.
    fn recording_dispatcher() -> (Dispatcher, Rc<RefCell<Vec<(&'static str, ResolvedParams)>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));

        let recorder = |name: &'static str, default_output_name| {
            let calls = Rc::clone(&calls);
            Operation::new(name, "records the call", default_output_name, move |params| {
                calls.borrow_mut().push((name, params.clone()));
                Ok(params.output_dir.join(&params.output_name))
            })
        };
        let operations = OperationTable::new(vec![
            recorder("img", DEFAULT_IMAGES_OUTPUT_NAME),
            recorder("pdf", DEFAULT_PDFS_OUTPUT_NAME),
        ]);

        (Dispatcher::new(FlagTable::standard(), operations), calls)
    }

    fn parse_params(dispatcher: &Dispatcher, tokens: &[&str]) -> Result<ResolvedParams> {
        match dispatcher.parse(&args(tokens), &mut never_asked)? {
            Command::Merge { params, .. } => Ok(params),
            other => Err(anyhow!("Expected a merge command, got {other:?}")),
        }
    }

    fn usage_error(result: Result<Command>) -> Result<UsageError> {
        let error = result.err().ok_or(anyhow!("The command was accepted"))?;
        error
            .downcast::<UsageError>()
            .map_err(|error| anyhow!("Not a usage error: {error}"))
    }

    #[test]
    fn no_arguments_prints_the_operations_and_fails() {
        let dispatcher = Dispatcher::standard();
        let (mut out, mut err) = (Vec::new(), Vec::new());

        let code = dispatcher.run(&[], &mut out, &mut err, &mut never_asked);

        assert_eq!(code, EXIT_FAILURE);
        let err = String::from_utf8_lossy(&err);
        assert!(err.contains("Please provide an operation"));
        for operation in ["img:", "pdf:", "help:"] {
            assert!(err.contains(operation), "missing '{operation}' in {err}");
        }
    }

    #[test]
    fn help_prints_the_full_message() {
        let dispatcher = Dispatcher::standard();
        let (mut out, mut err) = (Vec::new(), Vec::new());

        let code = dispatcher.run(&args(&["help"]), &mut out, &mut err, &mut never_asked);

        assert_eq!(code, EXIT_SUCCESS);
        let out = String::from_utf8_lossy(&out);
        assert!(out.contains("Operations:"));
        assert!(out.contains("-in, --input <input_directory>"));
        assert!(out.contains("-out, --output <output_directory>"));
        assert!(out.contains("merged_images.pdf"));
        assert!(err.is_empty());
    }

    #[test]
    fn help_on_a_topic_prints_its_description() {
        let dispatcher = Dispatcher::standard();
        let flags = FlagTable::standard();

        for topic in ["-in", "--output", "-name"] {
            let (mut out, mut err) = (Vec::new(), Vec::new());
            let code = dispatcher.run(&args(&["help", topic]), &mut out, &mut err, &mut never_asked);

            assert_eq!(code, EXIT_SUCCESS);
            let expected = format!("{topic}: {}\n", flags.get(topic).map_or("", |spec| spec.description));
            assert_eq!(String::from_utf8_lossy(&out), expected);
        }

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let code = dispatcher.run(&args(&["help", "help"]), &mut out, &mut err, &mut never_asked);
        assert_eq!(code, EXIT_SUCCESS);
        assert_eq!(String::from_utf8_lossy(&out), format!("help: {HELP_DESCRIPTION}\n"));
    }

    #[test]
    fn help_on_an_operation_prints_its_description() -> Result<()> {
        let dispatcher = Dispatcher::standard();

        let command = dispatcher.parse(&args(&["help", "pdf"]), &mut never_asked)?;

        assert_eq!(
            command,
            Command::TopicHelp {
                topic: "pdf".to_string(),
                description: "merge PDFs in the input directory into a single PDF file",
            }
        );
        Ok(())
    }

    #[test]
    fn help_on_an_unknown_topic_fails() -> Result<()> {
        let dispatcher = Dispatcher::standard();
        let (mut out, mut err) = (Vec::new(), Vec::new());

        let code = dispatcher.run(&args(&["help", "bogus"]), &mut out, &mut err, &mut never_asked);

        assert_eq!(code, EXIT_FAILURE);
        assert!(out.is_empty());
        assert!(String::from_utf8_lossy(&err).contains("bogus"));

        let error = usage_error(dispatcher.parse(&args(&["help", "bogus"]), &mut never_asked))?;
        assert_eq!(
            error,
            UsageError::UnknownHelpTopic {
                topic: "bogus".to_string()
            }
        );
        Ok(())
    }

    #[test]
    fn unknown_operation_fails() -> Result<()> {
        let (dispatcher, calls) = recording_dispatcher();

        let error = usage_error(dispatcher.parse(&args(&["docx", "-in", "."]), &mut never_asked))?;

        assert_eq!(
            error,
            UsageError::UnknownOperation {
                operation: "docx".to_string()
            }
        );
        assert!(calls.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn no_flags_resolve_to_defaults() -> Result<()> {
        let (dispatcher, _calls) = recording_dispatcher();

        let img = parse_params(&dispatcher, &["img"])?;
        assert_eq!(img.input_dir, PathBuf::from(CURRENT_DIRECTORY));
        assert_eq!(img.output_dir, PathBuf::from(CURRENT_DIRECTORY));
        assert_eq!(img.output_name, "merged_images.pdf");

        let pdf = parse_params(&dispatcher, &["pdf"])?;
        assert_eq!(pdf.input_dir, img.input_dir);
        assert_eq!(pdf.output_dir, img.output_dir);
        assert_eq!(pdf.output_name, "merged.pdf");

        Ok(())
    }

    #[test]
    fn directory_flags_resolve_to_their_argument() -> Result<()> {
        let test_dir = utils::get_virgin_test_dir("directory_flags_resolve_to_their_argument")?;
        let input_dir = format!("{test_dir}/in");
        let output_dir = format!("{test_dir}/out");
        std::fs::create_dir(&input_dir)?;
        std::fs::create_dir(&output_dir)?;
        let (dispatcher, _calls) = recording_dispatcher();

        let short = parse_params(&dispatcher, &["img", "-in", &input_dir, "-out", &output_dir])?;
        let long = parse_params(
            &dispatcher,
            &["img", "--input", &input_dir, "--output", &output_dir],
        )?;

        assert_eq!(short.input_dir, PathBuf::from(&input_dir));
        assert_eq!(short.output_dir, PathBuf::from(&output_dir));
        assert_eq!(short, long);

        Ok(())
    }

    #[test]
    fn short_form_takes_precedence_over_long_form() -> Result<()> {
        let test_dir = utils::get_virgin_test_dir("short_form_takes_precedence_over_long_form")?;
        let short_dir = format!("{test_dir}/short");
        let long_dir = format!("{test_dir}/long");
        std::fs::create_dir(&short_dir)?;
        std::fs::create_dir(&long_dir)?;
        let (dispatcher, _calls) = recording_dispatcher();

        let params = parse_params(&dispatcher, &["pdf", "--input", &long_dir, "-in", &short_dir])?;

        assert_eq!(params.input_dir, PathBuf::from(&short_dir));
        Ok(())
    }

    #[test]
    fn repeated_flag_keeps_the_last_value() -> Result<()> {
        let test_dir = utils::get_virgin_test_dir("repeated_flag_keeps_the_last_value")?;
        let first_dir = format!("{test_dir}/first");
        let last_dir = format!("{test_dir}/last");
        std::fs::create_dir(&first_dir)?;
        std::fs::create_dir(&last_dir)?;
        let (dispatcher, _calls) = recording_dispatcher();

        let params = parse_params(
            &dispatcher,
            &["img", "-out", &first_dir, "-name", "a", "-out", &last_dir, "-name", "b"],
        )?;

        assert_eq!(params.output_dir, PathBuf::from(&last_dir));
        assert_eq!(params.output_name, "b.pdf");
        Ok(())
    }

    #[test]
    fn empty_name_falls_back_to_the_operation_default() -> Result<()> {
        let (dispatcher, _calls) = recording_dispatcher();

        assert_eq!(
            parse_params(&dispatcher, &["img", "-name", ""])?.output_name,
            DEFAULT_IMAGES_OUTPUT_NAME
        );
        assert_eq!(
            parse_params(&dispatcher, &["pdf", "-name", ""])?.output_name,
            DEFAULT_PDFS_OUTPUT_NAME
        );
        assert_eq!(
            parse_params(&dispatcher, &["pdf", "-name", "kept", "-name", ""])?.output_name,
            DEFAULT_PDFS_OUTPUT_NAME
        );

        Ok(())
    }

    #[test]
    fn name_gets_a_pdf_suffix_once() -> Result<()> {
        let (dispatcher, _calls) = recording_dispatcher();

        assert_eq!(parse_params(&dispatcher, &["img", "-name", "foo"])?.output_name, "foo.pdf");
        assert_eq!(parse_params(&dispatcher, &["img", "-name", "foo.pdf"])?.output_name, "foo.pdf");
        assert_eq!(with_pdf_suffix(&with_pdf_suffix("report")), "report.pdf");

        Ok(())
    }

    #[test]
    fn name_must_not_be_a_path() -> Result<()> {
        let (dispatcher, _calls) = recording_dispatcher();

        let error = usage_error(dispatcher.parse(&args(&["pdf", "-name", "sub/out"]), &mut never_asked))?;

        assert_eq!(
            error,
            UsageError::InvalidOutputName {
                name: "sub/out".to_string()
            }
        );
        Ok(())
    }

    #[test]
    fn flag_argument_looking_like_a_flag_fails() -> Result<()> {
        let (dispatcher, _calls) = recording_dispatcher();

        let error = usage_error(dispatcher.parse(&args(&["img", "-in", "-out", "."]), &mut never_asked))?;

        assert_eq!(
            error,
            UsageError::ArgumentLooksLikeFlag {
                flag: "-in".to_string(),
                argument: "-out".to_string()
            }
        );
        Ok(())
    }

    #[test]
    fn flag_without_argument_fails() -> Result<()> {
        let (dispatcher, _calls) = recording_dispatcher();

        let error = usage_error(dispatcher.parse(&args(&["img", "-name"]), &mut never_asked))?;

        assert_eq!(
            error,
            UsageError::MissingArgument {
                flag: "-name".to_string()
            }
        );
        Ok(())
    }

    #[test]
    fn unknown_tokens_are_rejected_by_default() -> Result<()> {
        let (dispatcher, _calls) = recording_dispatcher();

        let error = usage_error(dispatcher.parse(&args(&["img", "stray", "-name", "x"]), &mut never_asked))?;

        assert_eq!(
            error,
            UsageError::UnknownFlag {
                flag: "stray".to_string()
            }
        );
        Ok(())
    }

    #[test]
    fn unknown_tokens_are_skipped_by_the_legacy_policy() -> Result<()> {
        let (dispatcher, _calls) = recording_dispatcher();
        let dispatcher = dispatcher.with_unknown_token_policy(UnknownTokenPolicy::Skip);

        let params = parse_params(&dispatcher, &["img", "stray", "-name", "x", "--verbose"])?;

        assert_eq!(params.output_name, "x.pdf");
        Ok(())
    }

    #[test]
    fn missing_directory_is_created_when_accepted() -> Result<()> {
        let test_dir = utils::get_virgin_test_dir("missing_directory_is_created_when_accepted")?;
        let missing = format!("{test_dir}/deep/missing");
        let (dispatcher, calls) = recording_dispatcher();
        let (mut out, mut err) = (Vec::new(), Vec::new());

        let mut asked = Vec::new();
        let mut accept = |directory: &Path| {
            asked.push(directory.to_path_buf());
            true
        };
        let code = dispatcher.run(&args(&["pdf", "-out", &missing]), &mut out, &mut err, &mut accept);

        assert_eq!(code, EXIT_SUCCESS);
        assert_eq!(asked, vec![PathBuf::from(&missing)]);
        assert!(Path::new(&missing).is_dir());
        assert_eq!(calls.borrow().len(), 1);
        Ok(())
    }

    #[test]
    fn missing_directory_declined_aborts_without_side_effects() -> Result<()> {
        let test_dir =
            utils::get_virgin_test_dir("missing_directory_declined_aborts_without_side_effects")?;
        let images_dir = format!("{test_dir}/images");
        std::fs::create_dir(&images_dir)?;
        utils::write_noise_image(format!("{images_dir}/one.png"), 4, 4)?;
        let missing = format!("{test_dir}/missing");

        let dispatcher = Dispatcher::standard();
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let mut prompt = crate::prompt::InteractivePrompt::new(std::io::Cursor::new("n\n"), std::io::sink());

        let code = dispatcher.run(
            &args(&["img", "-in", &images_dir, "-out", &missing]),
            &mut out,
            &mut err,
            &mut prompt,
        );

        assert_eq!(code, EXIT_FAILURE);
        assert!(!std::fs::exists(&missing)?);
        assert!(String::from_utf8_lossy(&err).contains("Aborting operation"));
        assert_eq!(std::fs::read_dir(&test_dir)?.count(), 1);
        Ok(())
    }

    #[test]
    fn missing_input_directory_is_prompted_for_both_forms() -> Result<()> {
        let test_dir =
            utils::get_virgin_test_dir("missing_input_directory_is_prompted_for_both_forms")?;
        let accepted = format!("{test_dir}/accepted");
        let declined = format!("{test_dir}/declined");
        let (dispatcher, calls) = recording_dispatcher();

        let mut asked = Vec::new();
        let mut accept = |directory: &Path| {
            asked.push(directory.to_path_buf());
            true
        };
        let command = dispatcher.parse(&args(&["img", "-in", &accepted]), &mut accept)?;
        assert_eq!(asked, vec![PathBuf::from(&accepted)]);
        assert!(Path::new(&accepted).is_dir());
        assert!(matches!(command, Command::Merge { .. }));

        let mut decline = |_directory: &Path| false;
        let error = usage_error(dispatcher.parse(&args(&["pdf", "--input", &declined]), &mut decline))?;
        assert_eq!(
            error,
            UsageError::DirectoryCreationDeclined {
                directory: PathBuf::from(&declined)
            }
        );
        assert!(!std::fs::exists(&declined)?);
        assert!(calls.borrow().is_empty());

        Ok(())
    }

    #[test]
    fn merge_failure_is_a_failed_exit() {
        let operations = OperationTable::new(vec![Operation::new(
            "img",
            "always fails",
            DEFAULT_IMAGES_OUTPUT_NAME,
            |_params| Err(anyhow!("unsupported image format")),
        )]);
        let dispatcher = Dispatcher::new(FlagTable::standard(), operations);
        let (mut out, mut err) = (Vec::new(), Vec::new());

        let code = dispatcher.run(&args(&["img"]), &mut out, &mut err, &mut never_asked);

        assert_eq!(code, EXIT_FAILURE);
        assert!(String::from_utf8_lossy(&err).contains("unsupported image format"));
    }

    #[test]
    fn img_merges_three_images_into_named_document() -> Result<()> {
        let test_dir = utils::get_virgin_test_dir("img_merges_three_images_into_named_document")?;
        let images_dir = format!("{test_dir}/imgs");
        let output_dir = format!("{test_dir}/out");
        std::fs::create_dir(&images_dir)?;
        std::fs::create_dir(&output_dir)?;
        for (name, width) in [("2.png", 12), ("1.png", 11), ("3.png", 13)] {
            utils::write_noise_image(format!("{images_dir}/{name}"), width, 8)?;
        }

        let dispatcher = Dispatcher::standard();
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let code = dispatcher.run(
            &args(&["img", "-in", &images_dir, "-out", &output_dir, "-name", "album"]),
            &mut out,
            &mut err,
            &mut never_asked,
        );

        assert_eq!(code, EXIT_SUCCESS, "{}", String::from_utf8_lossy(&err));
        let album = Document::load(format!("{output_dir}/album.pdf"))?;
        assert_eq!(album.get_pages().len(), 3);
        assert!(String::from_utf8_lossy(&out).contains("album.pdf"));

        Ok(())
    }

    #[test]
    fn pdf_merges_documents_with_default_name() -> Result<()> {
        let test_dir = utils::get_virgin_test_dir("pdf_merges_documents_with_default_name")?;
        utils::write_basic_pdf(format!("{test_dir}/first.pdf"), 2)?;
        utils::write_basic_pdf(format!("{test_dir}/second.pdf"), 5)?;

        let dispatcher = Dispatcher::standard();
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let code = dispatcher.run(
            &args(&["pdf", "--input", &test_dir, "--output", &test_dir]),
            &mut out,
            &mut err,
            &mut never_asked,
        );

        assert_eq!(code, EXIT_SUCCESS, "{}", String::from_utf8_lossy(&err));
        let merged = Document::load(format!("{test_dir}/{DEFAULT_PDFS_OUTPUT_NAME}"))?;
        assert_eq!(merged.get_pages().len(), 7);

        Ok(())
    }
}
