use {
    logsink::{Compression, FileSinkBuilder},
    std::time::Instant,
};

/// Writes enough JSON lines to roll a 5 MiB file a few times and keeps only
/// the two newest gzip archives.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let sink = FileSinkBuilder::new("./logs/sized", "sized")
        .max_size(5)
        .max_backups(2)
        .compression(Compression::GzipLevel(6))
        .build()?;

    for i in 1..=200_000 {
        sink.out(&format!(
            r#"{{"ts":{i},"level":"info","msg":"This is a sample log message that will contribute to file size"}}"#
        ))?;
    }
    sink.flush()?;

    println!("Done logging: {:?}", start.elapsed());
    for archive in logsink::retention::list_archives(&sink.config().directory, "sized")? {
        println!("{} ({})", archive.path.display(), archive.timestamp);
    }
    Ok(())
}
