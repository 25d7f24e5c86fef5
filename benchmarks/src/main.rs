use benchmarks::generate_test_data;
use scavenger_core::profile::ProfileStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("ProfileStore sanity check");
    println!("==========================");

    let store: ProfileStore<String> = ProfileStore::new();
    for obs in generate_test_data(50) {
        store.register("demo.task".to_string(), obs.observed_complexity, Some(obs.input_complexity));
    }

    let sample = generate_test_data(1)[0];
    let expected = store.get_complexity(&"demo.task".to_string(), 0.0, Some(sample.input_complexity));
    println!("expected complexity near input={:.1}: {:.4}", sample.input_complexity, expected);
    println!("\nRun 'cargo bench' to execute the ProfileStore benchmarks.");

    Ok(())
}
