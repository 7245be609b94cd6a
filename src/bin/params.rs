use cloudbag::generator::GeneratorParams;
use serde_json::json;

fn main() -> anyhow::Result<()> {
    let params = GeneratorParams::default();
    let json = json!(params);
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
