#[macro_use]
extern crate clap;

use std::io::{self, Cursor, Read};
use std::process;

use calc_expr::{
    parse_reader, GreedyTokenizer, ParseOptions, StandardContext, Token, Tokenizer,
};
use clap::{App, AppSettings, ArgMatches};
use env_logger::Env;

fn app() -> App<'static, 'static> {
    clap_app!(("calc-expr") =>
        (version: crate_version!())
        (about: "Tokenizes, parses and evaluates arithmetic expressions")
        (@arg EXPR: "The expression to read, taken from stdin when omitted")
        (@arg MAX_DEPTH: --("max-depth") +takes_value "Maximum nesting depth of the expression")
        (@arg VERBOSE: -v --verbose +multiple "Log more, repeat for even more")
        (@subcommand tokenize =>
            (about: "Tokenize the expression and print out the tokens")
        )
        (@subcommand ast =>
            (about: "Parse the expression and print its tree")
        )
        (@subcommand eval =>
            (about: "Evaluate the expression and print the result")
            (@arg DEFINE: -D --define +takes_value +multiple number_of_values(1)
                "Bind a variable, as name=value")
        )
    )
    .setting(AppSettings::SubcommandRequiredElseHelp)
    // expressions such as "-x*2" start with a hyphen
    .setting(AppSettings::AllowLeadingHyphen)
}

fn main() {
    let matches = app().get_matches();

    let default_filter = match matches.occurrences_of("VERBOSE") {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    if let Err(message) = run(&matches) {
        eprintln!("error: {}", message);
        process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> Result<(), String> {
    let options = parse_options(matches)?;
    let input = open_input(matches.value_of("EXPR"));

    match matches.subcommand() {
        ("tokenize", Some(_)) => tokenize(input),
        ("ast", Some(_)) => {
            let expr = parse_reader(input, options).map_err(|e| e.to_string())?;
            println!("{}", expr);
            Ok(())
        }
        ("eval", Some(eval_matches)) => {
            let ctx = bind_variables(eval_matches)?;
            let expr = parse_reader(input, options).map_err(|e| e.to_string())?;
            let value = expr.evaluate(&ctx).map_err(|e| e.to_string())?;
            println!("{}", value);
            Ok(())
        }
        _ => Err(String::from("no subcommand given")),
    }
}

fn parse_options(matches: &ArgMatches) -> Result<ParseOptions, String> {
    let max_depth = match matches.value_of("MAX_DEPTH") {
        Some(depth) => Some(
            depth
                .parse::<usize>()
                .map_err(|e| format!("invalid --max-depth '{}': {}", depth, e))?,
        ),
        None => None,
    };

    Ok(ParseOptions { max_depth })
}

fn open_input(expr: Option<&str>) -> Box<dyn Read> {
    match expr {
        Some(expr) => Box::new(Cursor::new(expr.to_owned())),
        None => Box::new(io::stdin()),
    }
}

fn bind_variables(matches: &ArgMatches) -> Result<StandardContext, String> {
    let mut ctx = StandardContext::new();
    for definition in matches.values_of("DEFINE").into_iter().flatten() {
        let (name, value) = definition
            .split_once('=')
            .ok_or_else(|| format!("expected name=value, got '{}'", definition))?;
        let value = value
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid value for '{}': {}", name, e))?;
        log::debug!("binding {} = {}", name, value);
        ctx.set_variable(name.trim(), value);
    }

    Ok(ctx)
}

fn tokenize(input: Box<dyn Read>) -> Result<(), String> {
    let mut tokenizer = GreedyTokenizer::new(input).map_err(|e| e.to_string())?;
    loop {
        let token_and_span = tokenizer.get_token().map_err(|e| e.to_string())?;
        println!("{}", token_and_span);

        // if we encounter Eof, break
        if token_and_span.token == Token::Eof {
            return Ok(());
        }
    }
}
