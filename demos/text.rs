//! Interactive text loop: prints each fragment as soon as it arrives.
//!
//! ```sh
//! PERCHANCE_USER_KEY=... cargo run --example text
//! ```

use std::io::{BufRead, Write};

use futures::StreamExt;
use perchance::{TextGenerator, TextProvider, TextRequest};

#[tokio::main]
async fn main() -> perchance::Result<()> {
    print!("Starting text generator...");
    std::io::stdout().flush()?;
    let generator = TextGenerator::builder().build()?;
    generator.refresh().await?;

    let stdin = std::io::stdin();
    loop {
        print!("\n---------------\nPrompt: ");
        std::io::stdout().flush()?;

        let mut prompt = String::new();
        if stdin.lock().read_line(&mut prompt)? == 0 {
            break;
        }
        let prompt = prompt.trim();
        if prompt.is_empty() {
            continue;
        }

        print!("Result: ");
        let mut stream = match generator.generate(&TextRequest::new(prompt)).await {
            Ok(stream) => stream,
            Err(e) => {
                eprintln!("Generation failed: {e}");
                continue;
            }
        };
        while let Some(fragment) = stream.next().await {
            match fragment {
                Ok(text) => {
                    print!("{text}");
                    std::io::stdout().flush()?;
                }
                Err(e) => {
                    eprintln!("\nStream ended early: {e}");
                    break;
                }
            }
        }
    }

    Ok(())
}
