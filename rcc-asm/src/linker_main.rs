use clap::Parser;
use rcc_asm::{Linker, ObjectFile};
use rcc_asm::types::Archive;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rlink")]
#[command(about = "Ripple Linker - Links object files into executable")]
#[command(version)]
struct Cli {
    /// Input object files (.pobj)
    inputs: Vec<PathBuf>,
    
    /// Output file
    #[arg(short, long)]
    output: Option<PathBuf>,
    
    /// Output format (binary, text, archive)
    #[arg(short, long, default_value = "binary")]
    format: String,

    /// Bank size
    #[arg(short, long, default_value = "4096")]
    bank_size: u16,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.inputs.is_empty() {
        eprintln!("Error: No input files specified");
        std::process::exit(1);
    }
    
    // Load all object files (with names for archive)
    let mut object_files = Vec::new();
    let mut named_object_files = Vec::new();
    for input_path in &cli.inputs {
        let content = fs::read_to_string(input_path)?;
        
        // Try to load as archive first
        if let Ok(archive) = serde_json::from_str::<Archive>(&content) {
            println!("Loaded archive {}", input_path.display());
            let extracted = Linker::extract_from_archive(&archive);
            object_files.extend(extracted);
            // For archive creation, preserve the archive name
            for entry in archive.objects {
                named_object_files.push((entry.name, entry.object));
            }
        } else {
            // Try as regular object file
            match serde_json::from_str::<ObjectFile>(&content) {
                Ok(obj) => {
                    println!("Loaded {}", input_path.display());
                    let name = input_path.file_stem()
                        .unwrap_or_default()
                        .to_string_lossy()
                        .into_owned();
                    named_object_files.push((name, obj.clone()));
                    object_files.push(obj);
                }
                Err(e) => {
                    eprintln!("Failed to parse {}: {}", input_path.display(), e);
                    std::process::exit(1);
                }
            }
        }
    }
    
    // Handle archive creation separately
    if cli.format == "archive" {
        let archive = Linker::create_archive(named_object_files);
        let output_path = cli.output.unwrap_or_else(|| PathBuf::from("lib.par"));
        let json = serde_json::to_string_pretty(&archive)?;
        fs::write(&output_path, json)?;
        println!("✓ Created archive {}", output_path.display());
        println!("  Contains {} object files", archive.objects.len());
        for entry in &archive.objects {
            println!("    - {}", entry.name);
        }
        return Ok(());
    }
    
    // Link the object files
    let linker = Linker::new(cli.bank_size);
    match linker.link(object_files) {
        Ok(program) => {
            let output_path = cli.output.unwrap_or_else(|| {
                PathBuf::from(match cli.format.as_str() {
                    "text" => "a.txt",
                    _ => "a.out",
                })
            });

            match cli.format.as_str() {
                "binary" => {
                    let binary = program.to_binary();
                    fs::write(&output_path, binary)?;
                    println!("✓ Linked to binary {}", output_path.display());
                }
                "text" => {
                    let text = program.to_text();
                    fs::write(&output_path, text)?;
                    println!("✓ Linked to text {}", output_path.display());
                }
                _ => {
                    eprintln!("Unknown format: {}", cli.format);
                    std::process::exit(1);
                }
            }
            
            // Print statistics
            println!("  Entry point: 0x{:08X}", program.entry_point);
            println!("  Instructions: {}", program.instructions.len());
            println!("  Data: {} bytes", program.data.len());
            println!("  Labels: {}", program.labels.len());
        }
        Err(errors) => {
            eprintln!("Linking failed:");
            for error in errors {
                eprintln!("  - {}", error);
            }
            std::process::exit(1);
        }
    }
    
    Ok(())
}