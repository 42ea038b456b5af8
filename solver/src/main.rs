use clap::{Parser, ValueEnum};
use gauss_solver::{SolverClient, system};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Provision the worker pool and report its size
    Init,
    /// Solve a random system on the workers
    Solve,
    /// Solve a random system both ways and compare
    Compare,
}

#[derive(Parser, Debug)]
#[command(name = "gauss-solver", about = "Client for the Gaussian elimination coordinator")]
struct Args {
    /// Coordinator address
    #[arg(default_value = "127.0.0.1:5000")]
    addr: String,

    #[arg(value_enum, default_value_t = Mode::Solve)]
    mode: Mode,

    /// System size
    #[arg(default_value_t = 3)]
    size: usize,

    /// Worker nodes to provision
    #[arg(default_value_t = 2)]
    nodes: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut client = SolverClient::connect(&args.addr).await?;
    let active = client.init_pool(args.nodes, Vec::new()).await?;
    println!("Worker pool ready: {active}/{} nodes", args.nodes);

    match args.mode {
        Mode::Init => {}
        Mode::Solve => {
            let m = system::diagonally_dominant(args.size, &mut rand::thread_rng())?;
            println!("Solving {0}x{0} system...", args.size);
            let solution = client.solve(&m).await?;
            println!("Residual: {:e}", m.residual(&solution.solution)?);
            if args.size <= 10 {
                for (i, x) in solution.solution.iter().enumerate() {
                    println!("  x[{i}] = {x}");
                }
            }
            for (phase, stats) in &solution.stats {
                println!("  {phase}: {:.3}ms over {} samples", stats.total_ms, stats.count);
            }
        }
        Mode::Compare => {
            let m = system::diagonally_dominant(args.size, &mut rand::thread_rng())?;
            println!("Comparing on {0}x{0} system...", args.size);
            let report = client.compare(&m).await?;
            println!("Linear:      {:.3}ms", report.linear_ms);
            println!("Distributed: {:.3}ms", report.distributed_ms);
            println!("Speedup:     {:.2}x", report.speedup);
            println!(
                "Matching:    {}/{} (max error {:e})",
                report.matching_elements, report.matrix_size, report.max_error
            );
            for (p, e) in &report.percentiles {
                println!("  p{p}: {e:e}");
            }
        }
    }
    Ok(())
}
