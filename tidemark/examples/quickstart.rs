//! Minimal tour: script a readable, transform it, assert the result.
//!
//! The input stream plays `a--b--c--|` on the virtual clock. The body
//! uppercases each value into a hand-driven output stream, and the
//! assertion checks the output timeline matches tick for tick.

use tidemark::{Harness, Values};

async fn run() -> tidemark::Result {
    let mut test = Harness::<String>::new();
    let values = Values::new();

    let mut input = test.readable("a--b--c--|", &values, None)?;
    let (out, observed) = test.source()?;
    test.assert_readable(observed, "A--B--C--|", &values, None)?;

    test.run(async move {
        while let Some(value) = input.read().await? {
            out.enqueue(value.to_uppercase())?;
        }
        out.close()?;
        Ok(())
    })
    .await?;

    println!("timeline matched; virtual elapsed: {:?}", test.virtual_elapsed());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error while executing example: {e}");
    }
}
