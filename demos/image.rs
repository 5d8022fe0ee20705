//! Interactive image loop: reads prompts from stdin and saves each result.
//!
//! ```sh
//! PERCHANCE_USER_KEY=... cargo run --example image
//! ```

use std::io::{BufRead, Write};

use perchance::{ImageGenerator, ImageProvider, ImageRequest};

#[tokio::main]
async fn main() -> perchance::Result<()> {
    println!("Initializing...");
    let generator = ImageGenerator::builder().build()?;
    // Warm the key so the first prompt does not pay for extraction.
    generator.refresh().await?;

    let stdin = std::io::stdin();
    loop {
        print!("Prompt: ");
        std::io::stdout().flush()?;

        let mut prompt = String::new();
        if stdin.lock().read_line(&mut prompt)? == 0 {
            break;
        }
        let prompt = prompt.trim();
        if prompt.is_empty() {
            continue;
        }

        println!("Generating...");
        match generator.generate(&ImageRequest::new(prompt)).await {
            Ok(image) => {
                let path = image.save_default().await?;
                println!("Result: {image} -> {}", path.display());
                image.close();
            }
            Err(e) => eprintln!("Generation failed: {e}"),
        }
    }

    Ok(())
}
