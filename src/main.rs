use makepdf::cli::Dispatcher;
use makepdf::prompt::InteractivePrompt;
use std::io;

/// Merge the images or the PDFs found in a directory into a single PDF document.
/// Run `makePDF help` for the list of operations and flags.
fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let dispatcher = Dispatcher::standard();
    let mut prompt = InteractivePrompt::stdio();

    let exit_code = dispatcher.run(&args, &mut io::stdout(), &mut io::stderr(), &mut prompt);
    std::process::exit(exit_code);
}
