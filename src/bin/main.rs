use std::path::Path;
use std::process::ExitCode;

use fat16_mem::{DEFAULT_IMAGE_SIZE, Result, Volume};

fn main() -> ExitCode {
    let image_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "fat16.img".to_string());

    match run(&image_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {} (errno {})", err, err.errno());
            ExitCode::FAILURE
        }
    }
}

fn run(image_path: &str) -> Result<()> {
    let mut volume = if Path::new(image_path).exists() {
        println!("Mounting existing image '{}'.", image_path);
        Volume::load_image(image_path)?
    } else {
        println!("Formatting a fresh {} byte image.", DEFAULT_IMAGE_SIZE);
        Volume::format_new(DEFAULT_IMAGE_SIZE)?
    };

    println!("Root before:");
    print_dir(&volume, "/")?;

    file_workflow(&mut volume)?;
    dir_workflow(&mut volume)?;

    println!("Root after:");
    print_dir(&volume, "/")?;

    let stats = volume.statfs();
    println!(
        "{} of {} blocks free ({} bytes each)",
        stats.free_blocks, stats.total_blocks, stats.block_size
    );

    volume.save_image(image_path)?;
    println!("Image saved to '{}'.", image_path);
    Ok(())
}

fn file_workflow(volume: &mut Volume) -> Result<()> {
    let path = "/hello";
    match volume.create(path) {
        Ok(()) => println!("File '{}' created.", path),
        Err(fat16_mem::FsError::AlreadyExists { .. }) => {
            println!("File '{}' already exists, truncating.", path);
            volume.open(path, true)?;
        }
        Err(err) => return Err(err),
    }

    let content = b"hello from the fat16 engine";
    let written = volume.write(path, 0, content)?;
    println!("Wrote {} bytes to '{}'.", written, path);

    let data = volume.read(path, 0, 4096)?;
    println!("Read back: {}", String::from_utf8_lossy(&data));

    let meta = volume.stat(path)?;
    println!("'{}' is {} bytes.", path, meta.size);
    Ok(())
}

fn dir_workflow(volume: &mut Volume) -> Result<()> {
    let dir = "/notes";
    match volume.mkdir(dir) {
        Ok(()) => println!("Directory '{}' created.", dir),
        Err(fat16_mem::FsError::AlreadyExists { .. }) => {
            println!("Directory '{}' already exists.", dir)
        }
        Err(err) => return Err(err),
    }

    volume.create("/notes/todo")?;
    volume.write("/notes/todo", 0, b"water the plants")?;
    println!("Contents of '{}':", dir);
    print_dir(volume, dir)?;

    volume.rename("/notes/todo", "/notes/done")?;
    println!("After rename:");
    print_dir(volume, dir)?;

    volume.unlink("/notes/done")?;
    volume.rmdir(dir)?;
    println!("Directory '{}' removed.", dir);
    Ok(())
}

fn print_dir(volume: &Volume, path: &str) -> Result<()> {
    let entries = volume.list_dir(path)?;
    if entries.is_empty() {
        println!("(empty)");
    } else {
        for e in entries {
            let kind = if e.is_directory { "<DIR>" } else { "     " };
            println!(
                "{:10} {}  cluster={}  size={}",
                e.name, kind, e.first_cluster, e.size
            );
        }
    }
    Ok(())
}
