//! Backpressure demonstration: pipe a steady producer into a sink that
//! stalls, then dies.
//!
//! The destination's series closes its gate at tick 5 (`<`), lifts it at
//! tick 20 (`>`), and aborts at tick 23 (`#`). While the gate is down the
//! first in-flight write is received but not completed, so the pipe stops
//! pulling; the values that pile up are released as a same-tick group the
//! moment the gate lifts. The abort then reaches the producer as a
//! cancellation carrying the abort reason.

use tidemark::{Harness, Reason, Values};

async fn run() -> tidemark::Result {
    let halt = Reason::new("sink gone");
    let mut test = Harness::<String>::new();
    let values = Values::new();

    let source = test.readable("---a---b---c---d----------|", &values, None)?;
    let dest = test.writable("-----<-------------->--#", Some(halt.clone()))?;

    test.assert_writable(&dest, "---a---b------------(cd)--!", &values, Some(halt))?;

    test.run(async move {
        // The pipe ends with the destination's abort; that is the point
        // of the scenario, not a test failure.
        let _ = source.pipe_to(&dest).await;
        Ok(())
    })
    .await?;

    println!("held writes released as a group when the gate lifted");
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
