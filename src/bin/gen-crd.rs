use kube::CustomResourceExt;
use kulta_analysis::crd::analysis_run::AnalysisRun;

fn main() -> anyhow::Result<()> {
    // Use: cargo run --bin gen-crd | python3 -c "import sys,json,yaml; print(yaml.dump(json.load(sys.stdin), default_flow_style=False))"
    // to convert to YAML
    let crd = serde_json::to_string_pretty(&AnalysisRun::crd())?;
    println!("{}", crd);
    Ok(())
}
