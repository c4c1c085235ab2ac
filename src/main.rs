//! Command-line driver: compile one AddNMult program and print (or write) its IR.

use std::{
    env, fs,
    io::{self, Read},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::Context;
use inkwell::context::Context as LlvmContext;
use tracing::info;

use addnmult::{
    codegen::{host_triple, CodeGen},
    compile,
    config::{LogFormat, Settings},
    jit,
};

const USAGE: &str = "Usage: addnmult [INPUT] [-o OUTPUT] [--run]";

const EXIT_FAILURE: u8 = 1;
const EXIT_USAGE: u8 = 2;

struct Args {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    run: bool,
}

impl Args {
    fn parse(raw: impl IntoIterator<Item = String>) -> Result<Self, String> {
        let mut args = Args {
            input: None,
            output: None,
            run: false,
        };
        let mut it = raw.into_iter();
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "-o" => {
                    let path = it.next().ok_or("missing value for -o")?;
                    args.output = Some(PathBuf::from(path));
                }
                "--run" => args.run = true,
                "-h" | "--help" => return Err(String::new()),
                flag if flag.starts_with('-') && flag != "-" => {
                    return Err(format!("unknown option `{flag}`"))
                }
                path => {
                    if args.input.is_some() {
                        return Err("more than one input file".into());
                    }
                    if path != "-" {
                        args.input = Some(PathBuf::from(path));
                    }
                }
            }
        }
        Ok(args)
    }
}

fn init_tracing(settings: &Settings) {
    let builder = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .with_max_level(settings.log_level());
    match settings.log_format() {
        LogFormat::Json => builder.json().with_current_span(false).init(),
        LogFormat::Text => builder.init(),
    }
}

fn read_source(input: Option<&PathBuf>) -> anyhow::Result<String> {
    match input {
        Some(path) => fs::read_to_string(path).with_context(|| format!("reading {:?}", path)),
        None => {
            let mut src = String::new();
            io::stdin()
                .read_to_string(&mut src)
                .context("reading standard input")?;
            Ok(src)
        }
    }
}

fn run(args: &Args, settings: &Settings) -> anyhow::Result<()> {
    let src = read_source(args.input.as_ref())?;

    let ctx = LlvmContext::create();
    let mut cg = CodeGen::new(&ctx, settings.module_name()).with_function_name(settings.function_name());
    let function = compile(&mut cg, &src)?;
    let function_name = function.get_name().to_string_lossy().into_owned();

    match &args.output {
        Some(out) if out.extension().is_some_and(|ext| ext == "o") => {
            cg.write_object(&host_triple(), out)?;
        }
        Some(out) => {
            cg.write_ir(out)?;
            info!(output = %out.display(), "wrote textual IR");
        }
        None => print!("{}", cg.print_ir()),
    }

    if args.run {
        let result = jit::evaluate(cg.module(), &function_name)?;
        println!("{result}");
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = match Args::parse(env::args().skip(1)) {
        Ok(args) => args,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
            }
            eprintln!("{USAGE}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let settings = Settings::detect();
    init_tracing(&settings);
    info!(
        module = settings.module_name(),
        module_source = %settings.module_name_source(),
        function = settings.function_name(),
        function_source = %settings.function_name_source(),
        "starting compilation"
    );

    ExitCode::from(exit_status(run(&args, &settings)))
}

/// Report a failed run on stderr and map it to the process exit status.
fn exit_status(result: anyhow::Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err:#}");
            EXIT_FAILURE
        }
    }
}
