use cinder::bytecode::disasm::disassemble_pool;
use cinder::bytecode::image::{self, ImageError};
use cinder::bytecode::{CONSTRUCTOR, CodeGen, CompileError, Op, Temp};
use cinder::lang::Value;
use cinder::runtime::{ObjectTable, ProgramPool, RuntimeError, Vm, VmConfig};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "cinder")]
#[command(about = "Inspect and run cinder program images")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the sample program pool and write its image
    Demo {
        #[arg(long, default_value = "demo.cnd")]
        out: PathBuf,
    },

    /// Print the listing of every program in an image
    Disasm { file: PathBuf },

    /// Spawn an object, construct it and call one of its methods
    Run {
        file: PathBuf,

        /// Type of the object to spawn
        #[arg(long)]
        object: String,

        #[arg(long, default_value = "main")]
        method: String,

        #[arg(long)]
        max_steps: Option<usize>,

        #[arg(long)]
        max_call_depth: Option<usize>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

fn main() {
    init_logging();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Demo { out } => run_demo(&out),
        Commands::Disasm { file } => run_disasm(&file),
        Commands::Run {
            file,
            object,
            method,
            max_steps,
            max_call_depth,
        } => {
            let mut config = VmConfig {
                max_steps,
                ..VmConfig::default()
            };
            if let Some(depth) = max_call_depth {
                config.max_call_depth = depth;
            }
            run_object(&file, &object, &method, config)
        }
    };

    if let Err(e) = result {
        fatal(e);
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,cinder=info"));

    fmt().with_env_filter(filter).with_target(false).init();
}

/// Report an unrecoverable error and terminate.
fn fatal(e: CliError) -> ! {
    eprintln!("cinder: {}", e);
    process::exit(1);
}

fn read_pool(path: &Path) -> Result<ProgramPool, CliError> {
    let bytes = fs::read(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image::decode(&bytes)?)
}

fn run_demo(out: &Path) -> Result<(), CliError> {
    let pool = demo_pool()?;
    let bytes = image::encode(&pool)?;

    fs::write(out, &bytes).map_err(|source| CliError::Io {
        path: out.to_path_buf(),
        source,
    })?;

    info!(
        programs = pool.len(),
        bytes = bytes.len(),
        "wrote {}",
        out.display()
    );
    Ok(())
}

fn run_disasm(file: &Path) -> Result<(), CliError> {
    let pool = read_pool(file)?;
    print!("{}", disassemble_pool(&pool));
    Ok(())
}

fn run_object(file: &Path, object: &str, method: &str, config: VmConfig) -> Result<(), CliError> {
    let pool = read_pool(file)?;
    let result = spawn_and_call(&pool, object, method, config)?;
    println!("{}", result);
    Ok(())
}

fn spawn_and_call(
    pool: &ProgramPool,
    object: &str,
    method: &str,
    config: VmConfig,
) -> Result<Value, RuntimeError> {
    let mut objects = ObjectTable::new();
    let handle = objects.spawn(object);

    let mut vm = Vm::with_config(pool, objects, config);
    vm.construct(handle)?;
    let result = vm.call(handle, method, &[])?;

    info!(steps = vm.steps(), "{}.{} finished", object, method);
    Ok(result)
}

// =============================================================================
// Demo pool
// =============================================================================

/// `Application` keeps a name and a counter in its two locals; its `main`
/// greets through `describe`, which it inherits from `Object`, then returns
/// the sum 1 + 2 + ... + counter.
fn demo_pool() -> Result<ProgramPool, CliError> {
    let mut pool = ProgramPool::new();

    let constructor = CodeGen::compile_object(2, |cg| {
        cg.emit_string("Application");
        cg.builder().add_line(Op::Poke(Temp::T0, 0));
        cg.emit_number(3.0);
        cg.builder().add_line(Op::Poke(Temp::T0, 1));
        Ok(())
    })?;
    pool.put("Application", CONSTRUCTOR, constructor)?;

    // describe(name): "hello from <name>"
    let mut describe = CodeGen::new(1);
    describe.emit_string("hello from ");
    describe.builder().add_line(Op::Speek(Temp::T1, -1));
    describe.builder().add_line(Op::Cat(Temp::T0, Temp::T1));
    describe.emit_return();
    pool.put("Object", "describe", describe.finish()?)?;

    let mut main = CodeGen::new(0);
    let b = main.builder();
    let describe_name = b.add_text("describe");
    b.add_line(Op::Movc(Temp::T1));
    b.add_line(Op::Push(Temp::T1));
    b.add_line(Op::Peek(Temp::T0, 0));
    b.add_line(Op::Push(Temp::T0));
    b.add_line(Op::Call(describe_name, 1));
    b.add_line(Op::Pop(Temp::T1));
    b.add_line(Op::Pop(Temp::T1));
    b.add_line(Op::Out(Temp::T0));

    let sum = b.new_label();
    b.add_line(Op::Peek(Temp::T2, 1));
    b.add_line(Op::Movf(Temp::T0, 0.0));
    b.add_label(sum)?;
    b.add_line(Op::Add(Temp::T0, Temp::T2));
    b.add_line(Op::Dec(Temp::T2));
    b.add_jump(Op::Jne, sum)?;
    main.emit_return();
    pool.put("Application", "main", main.finish()?)?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_pool_runs() {
        let pool = demo_pool().unwrap();
        let result = spawn_and_call(&pool, "Application", "main", VmConfig::default()).unwrap();
        assert_eq!(result, Value::Number(6.0));
    }

    #[test]
    fn test_demo_image_decodes() {
        let pool = demo_pool().unwrap();
        let restored = image::decode(&image::encode(&pool).unwrap()).unwrap();
        assert_eq!(restored.len(), 3);
        assert!(restored.exists("Object", "describe"));
    }

    #[test]
    fn test_unknown_method_is_runtime_error() {
        let pool = demo_pool().unwrap();
        let err = spawn_and_call(&pool, "Application", "missing", VmConfig::default()).unwrap_err();
        assert!(err.to_string().contains("can't find function \"missing\""));
    }

    #[test]
    fn test_step_limit_from_config() {
        let pool = demo_pool().unwrap();
        let config = VmConfig {
            max_steps: Some(5),
            ..VmConfig::default()
        };
        assert!(spawn_and_call(&pool, "Application", "main", config).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = read_pool(Path::new("/nonexistent/demo.cnd")).unwrap_err();
        assert!(matches!(err, CliError::Io { .. }));
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "cinder",
            "run",
            "demo.cnd",
            "--object",
            "Application",
            "--max-steps",
            "100",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                object,
                method,
                max_steps,
                max_call_depth,
                ..
            } => {
                assert_eq!(object, "Application");
                assert_eq!(method, "main");
                assert_eq!(max_steps, Some(100));
                assert_eq!(max_call_depth, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
