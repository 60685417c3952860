mod bytecode;
mod codegen;
mod runtime;

use std::io::{self, BufReader, Write};
use std::{env, fs, path::Path, path::PathBuf};

use crate::bytecode::disasm::{decode, instruction_counts, print_image};
use crate::bytecode::{Backend, ObjectImage, SymbolMap};
use crate::codegen::demo::demo_program;
use crate::runtime::{Vm, VmConfig};

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();

    let demo = args.contains(&"--demo".to_string());
    let dis = args.contains(&"--dis".to_string());
    let run = args.contains(&"--run".to_string());
    let stats = args.contains(&"--stats".to_string());
    let max_steps = flag_value(&args, "--max-steps").map(|v| match v.parse::<usize>() {
        Ok(n) => n,
        Err(_) => {
            eprintln!("Error: --max-steps expects a number, got '{}'", v);
            std::process::exit(1);
        }
    });

    // first non-flag argument (that is not a flag's value) is the filename
    let filename = args
        .iter()
        .enumerate()
        .skip(1)
        .find(|(i, a)| !a.starts_with('-') && args[i - 1] != "--max-steps")
        .map(|(_, a)| a.as_str());

    match filename {
        Some(filename) if demo => write_demo(filename),
        Some(filename) if dis => disassemble(filename, stats),
        Some(filename) if run => run_file(filename, max_steps),
        _ => print_usage(),
    }
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    // RUST_LOG controls the level, warn by default
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).map(String::as_str)
}

fn print_usage() {
    println!("MJC - code generator and stack machine for MJ object files");
    println!();
    println!("Usage:");
    println!("  mjc --demo <out.mj>                 Generate the demo program");
    println!("  mjc --dis <file.mj> [--stats]       Disassemble an object file");
    println!("  mjc --run <file.mj> [--max-steps N] Execute an object file");
    println!();
    println!("Set RUST_LOG=debug to trace code generation.");
}

fn symbol_path(filename: &str) -> PathBuf {
    let mut path = PathBuf::from(filename).into_os_string();
    path.push(".sym");
    PathBuf::from(path)
}

fn load_image(filename: &str) -> ObjectImage {
    let bytes = match fs::read(filename) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", filename, e);
            std::process::exit(1);
        }
    };
    match ObjectImage::from_bytes(&bytes) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Load error: {}", e);
            std::process::exit(1);
        }
    }
}

fn write_demo(filename: &str) {
    let mut backend = match demo_program() {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("Compile error: {}", e);
            std::process::exit(1);
        }
    };

    let mut file = match fs::File::create(filename) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to create '{}': {}", filename, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = backend.write_object_file(&mut file) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let symbols = match backend.symbol_map().to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    let sym_path = symbol_path(filename);
    if let Err(e) = fs::write(&sym_path, symbols) {
        eprintln!("Failed to write '{}': {}", sym_path.display(), e);
        std::process::exit(1);
    }

    println!("wrote {} and {}", filename, sym_path.display());
}

fn disassemble(filename: &str, stats: bool) {
    let image = load_image(filename);

    let sym_path = symbol_path(filename);
    let symbols = if Path::new(&sym_path).exists() {
        match fs::read(&sym_path).map_err(Into::into).and_then(|b| SymbolMap::from_bytes(&b)) {
            Ok(map) => Some(map),
            Err(e) => {
                eprintln!("Warning: ignoring '{}': {}", sym_path.display(), e);
                None
            }
        }
    } else {
        None
    };

    if let Err(e) = print_image(&image, symbols.as_ref()) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    if stats {
        // print_image already decoded the segment successfully
        let decoded = decode(&image.code).unwrap_or_default();
        println!();
        println!("; {} instructions", decoded.len());
        for (mnemonic, count) in instruction_counts(&decoded) {
            println!(";   {:<12}{}", mnemonic, count);
        }
    }
}

fn run_file(filename: &str, max_steps: Option<usize>) {
    let image = load_image(filename);

    let config = VmConfig {
        max_steps,
        ..VmConfig::default()
    };
    let mut vm = Vm::with_config(config).with_reader(Box::new(BufReader::new(io::stdin())));

    let result = vm.run(&image);

    let mut stdout = io::stdout();
    if let Err(e) = stdout.write_all(vm.output()).and_then(|()| stdout.flush()) {
        eprintln!("Failed to write program output: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
