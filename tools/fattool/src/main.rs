mod logger;

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};
use std::{env, fs, process};

use fatvol::{
    DirOptions, DosStamp, FileOptions, FragReport, Usage, Volume, free_bad, mark_bad_every,
    sync_free_count,
};

const USAGE: &str = "\
usage: fattool info <device>
       fattool info frag <device>
       fattool fragment <device> <interval>
       fattool freebad <device>
       fattool ls <device> [path]
       fattool cat <device> <path>
       fattool put <device> <dir-path> <name> <host-file>
       fattool mkdir <device> <dir-path> <name>";

enum Command<'a> {
    Info,
    Frag,
    Fragment(u32),
    FreeBad,
    Ls(&'a str),
    Cat(&'a str),
    Put { dir: &'a str, name: &'a str, host: &'a str },
    Mkdir { dir: &'a str, name: &'a str },
}

/// `(device, command)`, or `None` for anything malformed.
fn parse(args: &[String]) -> Option<(&str, Command<'_>)> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let parsed = match args.as_slice() {
        ["info", "frag", dev] => (*dev, Command::Frag),
        ["info", dev] => (*dev, Command::Info),
        ["fragment", dev, interval] => (*dev, Command::Fragment(interval.parse().ok()?)),
        ["freebad", dev] => (*dev, Command::FreeBad),
        ["ls", dev] => (*dev, Command::Ls("/")),
        ["ls", dev, path] => (*dev, Command::Ls(*path)),
        ["cat", dev, path] => (*dev, Command::Cat(*path)),
        ["put", dev, dir, name, host] => (*dev, Command::Put { dir: *dir, name: *name, host: *host }),
        ["mkdir", dev, dir, name] => (*dev, Command::Mkdir { dir: *dir, name: *name }),
        _ => return None,
    };
    Some(parsed)
}

fn run(vol: &mut Volume<File>, command: &Command) -> fatvol::Result<()> {
    match *command {
        Command::Info => {
            let geo = *vol.geometry();
            let usage = Usage::scan(vol)?;
            println!("type:            FAT{}", u8::from(geo.fat_type));
            println!("bytes/sector:    {}", geo.bytes_per_sector);
            println!("bytes/cluster:   {}", geo.bytes_per_cluster);
            println!("clusters:        {} (max index {})", geo.clusters, geo.max_cluster);
            println!("FAT copies:      {} x {} sectors", geo.num_fats, geo.fat_sectors);
            println!("free:            {}", usage.free);
            println!("used:            {}", usage.used);
            println!("bad:             {}", usage.bad);
            if usage.reserved > 0 {
                println!("reserved:        {}", usage.reserved);
            }
            match sync_free_count(vol, &usage) {
                Some(Some(stale)) => println!("fsinfo free:     {} (was {stale})", usage.free),
                Some(None) => println!("fsinfo free:     {} (was unknown)", usage.free),
                None if vol.fsinfo().is_some() => println!("fsinfo free:     {}", usage.free),
                None => {}
            }
        }
        Command::Frag => {
            let report = FragReport::scan(vol)?;
            println!("chains:          {}", report.chains);
            println!("links:           {}", report.links);
            println!("fragments:       {}", report.fragments);
            println!("longest extent:  {}", report.longest_extent);
            println!("shortest extent: {}", report.shortest_extent);
            println!("fragmentation:   {:.2}%", report.percent());
        }
        Command::Fragment(interval) => {
            let marked = mark_bad_every(vol, interval)?;
            println!("marked {marked} clusters bad");
        }
        Command::FreeBad => {
            let freed = free_bad(vol)?;
            println!("freed {freed} bad clusters");
        }
        Command::Ls(path) => {
            let dir = vol.open_dir(path)?;
            for item in dir.entries(vol)? {
                let kind = if item.entry.is_dir() { 'd' } else { '-' };
                let m = item.entry.modified;
                let date = format!("{}-{:02}-{:02}", m.year(), m.month(), m.day());
                let short = item.short_name();
                if short == item.name {
                    println!("{kind} {:>10} {date} {}", item.entry.length, item.name);
                } else {
                    println!("{kind} {:>10} {date} {}  ({short})", item.entry.length, item.name);
                }
            }
        }
        Command::Cat(path) => {
            let item = vol.lookup(path)?;
            let data = vol.open_file(&item).pread(vol, 0, None)?;
            std::io::stdout().write_all(&data)?;
        }
        Command::Put { dir, name, host } => {
            let content = fs::read(host)?;
            let stamp = fs::metadata(host)?.modified().ok().and_then(dos_stamp).unwrap_or_default();
            let target = vol.open_dir(dir)?;
            let opts = FileOptions { content: &content, stamp, ..Default::default() };
            let chain = target.mkfile(vol, name, &opts)?;
            log::info!("wrote {} bytes to {name} (cluster {})", chain.length, chain.head);
        }
        Command::Mkdir { dir, name } => {
            let parent = vol.open_dir(dir)?;
            parent.mkdir(vol, name, &DirOptions::default())?;
        }
    }
    Ok(())
}

/// UTC calendar time of `time`, if it falls inside the DOS date range.
fn dos_stamp(time: SystemTime) -> Option<DosStamp> {
    let secs = time.duration_since(UNIX_EPOCH).ok()?.as_secs();
    let (days, rem) = (secs / 86_400, secs % 86_400);

    // Days since 1970-01-01 to a civil date, in 400-year eras from 0000-03-01.
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z % 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + u64::from(month <= 2);

    DosStamp::new(
        u16::try_from(year).ok()?,
        month as u8,
        day as u8,
        (rem / 3600) as u8,
        (rem / 60 % 60) as u8,
        (rem % 60) as u8,
    )
}

fn main() {
    if let Err(e) = logger::init() {
        eprintln!("fattool: logger setup failed: {e}");
    }

    let args: Vec<String> = env::args().skip(1).collect();
    let Some((device, command)) = parse(&args) else {
        eprintln!("{USAGE}");
        process::exit(2);
    };

    let file = match OpenOptions::new().read(true).write(true).open(device) {
        Ok(file) => file,
        Err(e) => {
            log::error!("{device}: {e}");
            process::exit(1);
        }
    };
    let result = Volume::open(file).and_then(|mut vol| vol.session(|vol| run(vol, &command)));
    if let Err(e) = result {
        log::error!("{device}: {e}");
        process::exit(1);
    }
}
