//! Reads one JSON command per line from stdin and prints what every built-in
//! translator makes of it. `RUST_LOG=command_expr=trace` shows the rendering.

use command_expr::{
    command::Command,
    dialect::Dialect,
    translate::{
        BackendCommand, Domain, Translator, file::FileTranslator, odata::ODataTranslator,
        sql::SqlTranslator,
    },
};

fn print_backend(command: &BackendCommand, indent: usize) {
    let pad = " ".repeat(indent);
    match command {
        BackendCommand::Sql(sql) => {
            println!("{pad}{}", sql.command_text);
            for (name, value) in sql.parameters.iter() {
                println!("{pad}  {name} = {value:?}");
            }
        }
        BackendCommand::Rest(request) => {
            println!("{pad}{} {}", request.method, request.url);
            if let Some(body) = &request.body {
                println!("{pad}  {body}");
            }
        }
        BackendCommand::File(op) => println!("{pad}{:?} {}", op.operation, op.path.display()),
        BackendCommand::Batch(batch) => {
            println!(
                "{pad}batch of {} (continue on error: {})",
                batch.commands.len(),
                batch.continue_on_error
            );
            for command in &batch.commands {
                print_backend(command, indent + 2);
            }
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "command_expr=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let sql_translators = [
        Dialect::sql_server(),
        Dialect::postgres(),
        Dialect::mysql(),
        Dialect::sqlite(),
        Dialect::ansi(),
    ]
    .map(SqlTranslator::new);
    let odata = ODataTranslator::new("https://example.com/odata");
    let file = FileTranslator::new("data", "json");

    for line in std::io::stdin().lines() {
        let line = line.expect("a line");
        if line.trim().is_empty() {
            continue;
        }
        let command: Command = match serde_json::from_str(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("Error reading command: {e}");
                continue;
            }
        };

        let mut targets: Vec<(String, &dyn Translator)> = sql_translators
            .iter()
            .map(|t| (format!("{} {}", t.domain_name(), t.dialect().name), t as &dyn Translator))
            .collect();
        targets.push((odata.domain_name().to_string(), &odata));
        targets.push((file.domain_name().to_string(), &file));

        for (label, translator) in targets {
            let now = std::time::Instant::now();
            let res = translator.translate(&command);
            print!("[{label} in {}μs] ", now.elapsed().as_micros());
            match res {
                Err(e) => println!("Error: {e}"),
                Ok(backend) => {
                    println!();
                    print_backend(&backend, 2);
                }
            }
        }
    }
}
