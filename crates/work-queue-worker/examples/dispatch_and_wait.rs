use std::time::Duration;
use work_queue_client::BlockingDispatcher;
use work_queue_core::Task;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Connecting to work queue...");
    let dispatcher = BlockingDispatcher::connect("127.0.0.1:5673", "tasks")?;

    // Fire and forget
    dispatcher.run_background(Task::new("echo", b"Nobody waits for me".to_vec())?)?;

    // Wait for a result
    println!("Dispatching echo task...");
    let task = Task::new("echo", b"Hello from Rust!".to_vec())?;
    match dispatcher.run_and_wait(task, Duration::from_secs(30)) {
        Ok(result) => match result.into_output() {
            Ok(output) => println!("Result: {}", String::from_utf8_lossy(&output)),
            Err(failure) => eprintln!("Task failed: {}", failure),
        },
        Err(e) => eprintln!("Dispatch failed: {}", e),
    }

    // Same thing with callbacks
    let task = Task::new("sleep", b"slow".to_vec())?;
    dispatcher.run_background_with_callbacks(
        task,
        Duration::from_millis(100),
        |result| println!("Completed in time: {}", result.is_success()),
        || println!("Gave up waiting after 100ms"),
    )?;

    Ok(())
}
