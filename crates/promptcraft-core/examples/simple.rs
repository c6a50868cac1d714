use promptcraft_core::{DirectoryLocator, Expectations, Suite};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Example 1: Inline prompt against the default provider
    let suite = Suite::builder("greeting")
        .provider("openai:gpt-4o-mini")
        .build();

    let mut expect = Expectations::new();
    expect.includes("Alice").matches("^[A-Z]").rubric("Is friendly and polite");

    let outcome = suite
        .prompt("Write a one-line greeting for {{name}}.")
        .var("name", "Alice")
        .run(&expect)
        .await?;
    println!("{}", outcome.document.summary_table());
    if let Some(report) = outcome.failure_message() {
        println!("{report}");
    }

    // Example 2: Prompts from a directory, JSON output from two providers
    if let Some(root) = std::env::args().nth(1) {
        let suite = suite
            .derive("classifier")
            .provider("anthropic:messages:claude-3-5-haiku-latest")
            .locator(DirectoryLocator::new(root))
            .build();

        let mut expect = Expectations::new();
        expect.force_json().json_includes("label", "positive");

        suite
            .prompt_for("sentiment")?
            .var("review", "Loved every minute of it.")
            .verbose(true)
            .assert_passes(&expect)
            .await?;
    }

    Ok(())
}
