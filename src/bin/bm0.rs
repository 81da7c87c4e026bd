//! Command-line runner for the byte machine.
//!
//! Assembles (or loads) a program, places it in sub-buffer 0 of a fresh
//! input-buffers blob together with any data files, and runs it against the
//! host operating system.
//!
//! # Usage
//! ```text
//! bm0 <program.asm|program.bin> [OPTIONS]
//! ```
//!
//! Files ending in `.asm` are assembled first; anything else is loaded as a
//! raw program image.
//!
//! # Examples
//! ```text
//! bm0 demos/hello.asm
//! bm0 demos/hello.asm --emit hello.bin
//! bm0 hello.bin --dump --step-limit 1000
//! bm0 prog.asm --data table.bin --data input.txt
//! ```

use bytemachine::utils::log::{self, Level};
use bytemachine::virtual_machine::assembler::assemble_file;
use bytemachine::virtual_machine::buffer::InputBuffers;
use bytemachine::virtual_machine::limits::MAX_INPUT_SUB_BUFFER_COUNT;
use bytemachine::virtual_machine::syscall::LinuxHost;
use bytemachine::virtual_machine::vm::{VM, VmConfig};
use bytemachine::{error, info, warn};
use std::env;
use std::fs;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let program_path = &args[1];
    let mut data_paths: Vec<String> = Vec::new();
    let mut emit_path: Option<String> = None;
    let mut config = VmConfig::default();

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--data" | "-d") => {
                data_paths.push(required_value(&args, i, k).to_string());
                i += 2;
            }
            k @ "--emit" => {
                emit_path = Some(required_value(&args, i, k).to_string());
                i += 2;
            }
            k @ "--step-limit" => {
                let raw = required_value(&args, i, k);
                let limit = raw.parse::<u64>().unwrap_or_else(|_| {
                    error!("Invalid step limit: '{}' is not a valid number", raw);
                    process::exit(1);
                });
                config = config.with_step_limit(limit);
                i += 2;
            }
            "--dump" => {
                config = config.with_dump_on_quit(true);
                i += 1;
            }
            "--no-bounds-check" => {
                config = config.with_fetch_bounds_check(false);
                i += 1;
            }
            "--verbose" | "-v" => {
                log::set_level(Level::Debug);
                i += 1;
            }
            "--quiet" | "-q" => {
                log::set_level(Level::Error);
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    if data_paths.len() >= MAX_INPUT_SUB_BUFFER_COUNT {
        error!(
            "At most {} data files can be passed",
            MAX_INPUT_SUB_BUFFER_COUNT - 1
        );
        process::exit(1);
    }

    let image = load_program(program_path);

    if let Some(path) = &emit_path {
        if let Err(e) = fs::write(path, &image) {
            error!("Failed to write output file: {}", e);
            process::exit(1);
        }
        info!("Compiled {} -> {} ({} bytes)", program_path, path, image.len());
    }

    let mut input = InputBuffers::with_program(&image).unwrap_or_else(|e| {
        error!("{e}");
        process::exit(1)
    });
    for path in &data_paths {
        let bytes = fs::read(path).unwrap_or_else(|e| {
            error!("Failed to read data file {}: {}", path, e);
            process::exit(1)
        });
        if let Err(e) = input.push(&bytes) {
            error!("{e}");
            process::exit(1);
        }
    }

    let mut vm = VM::new(config);
    let mut host = LinuxHost;
    // SAFETY: the blob describes buffers owned by `input`, which outlives the
    // run. The program itself is trusted with the process address space.
    let result = unsafe { vm.run(&mut host, input.as_blob()) };

    match result {
        Ok(output) => {
            info!(
                "Program quit after {} instructions, output: [ {:#x}, {} ]",
                vm.steps(),
                output.data,
                output.length
            );
            let soft = vm.soft_error();
            if soft != 0 {
                warn!("Soft error register holds {}", soft);
            }
        }
        Err(e) => {
            error!("Execution failed: {}", e);
            process::exit(e.code().as_word().max(1) as i32);
        }
    }
}

fn required_value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            error!("{flag} requires an argument");
            process::exit(1);
        }
    }
}

fn load_program(path: &str) -> Vec<u8> {
    if !Path::new(path).exists() {
        error!("Input file does not exist: {}", path);
        process::exit(1);
    }

    if Path::new(path).extension().is_some_and(|ext| ext == "asm") {
        // The assembler already printed a diagnostic.
        assemble_file(path).unwrap_or_else(|_| process::exit(1))
    } else {
        fs::read(path).unwrap_or_else(|e| {
            error!("Failed to read program: {}", e);
            process::exit(1)
        })
    }
}

const USAGE: &str = "\
Byte Machine Runner

USAGE:
    {program} <program.asm|program.bin> [OPTIONS]

ARGS:
    <program>    Assembly source (.asm) or raw program image

OPTIONS:
    -d, --data <file>        Append a data file as the next sub-buffer (repeatable)
        --emit <file>        Write the assembled program image to <file>
        --dump               Dump registers and output when QUIT runs
        --step-limit <n>     Fault after <n> instructions
        --no-bounds-check    Allow fetching instructions outside the program
    -v, --verbose            Trace every dispatched instruction
    -q, --quiet              Only log errors
    -h, --help               Print this help message

EXAMPLES:
    # Assemble and run
    {program} demos/hello.asm

    # Keep the assembled image
    {program} demos/hello.asm --emit hello.bin

    # Run an image with a data sub-buffer and a register dump
    {program} hello.bin --data input.txt --dump
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
