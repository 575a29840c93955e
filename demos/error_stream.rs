use logsink::{FileSinkBuilder, RollTarget, Sink};

/// Sends error lines to their own file and rolls it by hand.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sink = FileSinkBuilder::new("./logs", "app")
        .error_name("app-error")
        .max_backups(24)
        .max_age(7)
        .debug(true)
        .build()?;

    sink.out(r#"{"level":"info","msg":"server listening on port 8080"}"#)?;
    sink.debug(r#"{"level":"debug","msg":"config loaded"}"#)?;
    for error_code in [500, 502, 503, 504] {
        sink.err(&format!(
            r#"{{"level":"error","code":{error_code},"msg":"server encountered an internal error"}}"#
        ))?;
    }

    let archive = sink.roll(RollTarget::Err)?;
    println!("error log archived to {}", archive.display());
    Ok(())
}
