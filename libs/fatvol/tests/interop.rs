//! Cross-checks against the independent `fatfs` implementation: images are
//! formatted by `fatfs`, mutated by `fatvol`, and read back by `fatfs` (and
//! the other way round).

use std::io::{Cursor, Read, Write};

use fatvol::{
    Chain, DirOptions, FatType, FileOptions, FragReport, ShortEntry, Volume, free_bad,
    mark_bad_every,
};

type Disk = Cursor<Vec<u8>>;

// ── helpers ──────────────────────────────────────────────────────────────────

/// 16 MB FAT16 image.
fn fat16_image() -> Vec<u8> {
    format(16 * 1024 * 1024, fatfs::FatType::Fat16)
}

/// 40 MB FAT32 image (fatfs picks 512-byte clusters, enough for FAT32).
fn fat32_image() -> Vec<u8> {
    format(40 * 1024 * 1024, fatfs::FatType::Fat32)
}

fn format(size: usize, fat_type: fatfs::FatType) -> Vec<u8> {
    let mut cursor = Cursor::new(vec![0u8; size]);
    fatfs::format_volume(&mut cursor, fatfs::FormatVolumeOptions::new().fat_type(fat_type))
        .expect("format_volume failed");
    cursor.into_inner()
}

fn open(img: Vec<u8>) -> Volume<Disk> {
    Volume::open(Cursor::new(img)).expect("fatvol failed to open image")
}

fn close(vol: Volume<Disk>) -> Vec<u8> {
    vol.close().expect("flush failed").into_inner()
}

fn read_via_fatfs(img: &mut Vec<u8>, path: &str) -> Vec<u8> {
    let mut cursor = Cursor::new(img);
    let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new()).unwrap();
    let mut f = fs.root_dir().open_file(path).unwrap();
    let mut buf = Vec::new();
    f.read_to_end(&mut buf).unwrap();
    buf
}

/// (long name, short name, is_dir) of every entry in `dir` as fatfs sees it.
fn list_via_fatfs(img: &mut Vec<u8>, dir: &str) -> Vec<(String, String, bool)> {
    let mut cursor = Cursor::new(img);
    let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new()).unwrap();
    let root = fs.root_dir();
    let dir = if dir.is_empty() { root } else { root.open_dir(dir).unwrap() };
    dir.iter()
        .map(|e| e.unwrap())
        .map(|e| (e.file_name(), e.short_file_name(), e.is_dir()))
        .collect()
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 251) as u8).collect()
}

// ── opening fatfs images ─────────────────────────────────────────────────────

#[test]
fn opens_fatfs_images() {
    let vol = open(fat16_image());
    assert_eq!(vol.fat_type(), FatType::Fat16);
    assert!(vol.fsinfo().is_none());

    let vol = open(fat32_image());
    assert_eq!(vol.fat_type(), FatType::Fat32);
    assert_eq!(vol.root_cluster(), 2);
    assert!(vol.fsinfo().is_some());
}

// ── fatvol writes, fatfs reads ───────────────────────────────────────────────

#[test]
fn hello_txt_end_to_end() {
    let mut vol = open(fat16_image());
    let chain = vol
        .session(|vol| {
            let root = vol.root()?;
            root.mkfile(vol, "HELLO.TXT", &FileOptions { content: b"hi", ..Default::default() })
        })
        .unwrap();

    assert_eq!(Chain::new(chain.head, 2).pread(&mut vol, 0, Some(2)).unwrap(), b"hi");
    let item = vol.lookup("HELLO.TXT").unwrap();
    let raw = vol.root().unwrap().read_slots(&mut vol, item.slot.slot, 1).unwrap();
    let entry = ShortEntry::parse(raw[..32].try_into().unwrap());
    assert_eq!(&entry.name, b"HELLO   TXT");
    assert_eq!(entry.length, 2);

    let mut img = close(vol);
    assert_eq!(read_via_fatfs(&mut img, "HELLO.TXT"), b"hi");
}

#[test]
fn long_name_visible_to_fatfs() {
    let content = pattern(5000);
    let mut vol = open(fat32_image());
    vol.session(|vol| {
        let root = vol.root()?;
        root.mkfile(vol, "a very long name.txt", &FileOptions { content: &content, ..Default::default() })
    })
    .unwrap();

    let mut img = close(vol);
    let listing = list_via_fatfs(&mut img, "");
    assert!(listing.contains(&(
        String::from("a very long name.txt"),
        String::from("AVERYL~1.TXT"),
        false
    )));
    assert_eq!(read_via_fatfs(&mut img, "a very long name.txt"), content);
}

#[test]
fn directories_visible_to_fatfs() {
    for img in [fat16_image(), fat32_image()] {
        let mut vol = open(img);
        vol.session(|vol| {
            let root = vol.root()?;
            let Some(projects) = root.mkdir(vol, "Projects", &DirOptions::default())? else {
                unreachable!("live directory expected")
            };
            projects.mkfile(vol, "notes.txt", &FileOptions { content: b"todo", ..Default::default() })?;
            Ok(())
        })
        .unwrap();

        let mut img = close(vol);
        let listing = list_via_fatfs(&mut img, "Projects");
        let names: Vec<&str> = listing.iter().map(|(name, _, _)| name.as_str()).collect();
        assert_eq!(names, [".", "..", "notes.txt"]);
        assert_eq!(read_via_fatfs(&mut img, "Projects/notes.txt"), b"todo");
    }
}

#[test]
fn grown_file_visible_to_fatfs() {
    let content = pattern(3000);
    let mut vol = open(fat16_image());
    vol.session(|vol| {
        let root = vol.root()?;
        let mut chain = root.mkfile(vol, "grow.bin", &FileOptions::default())?;
        chain.truncate(vol, content.len() as u32)?;
        chain.pwrite(vol, 0, &content)
    })
    .unwrap();

    let mut img = close(vol);
    assert_eq!(read_via_fatfs(&mut img, "grow.bin"), content);
}

#[test]
fn fragmented_file_visible_to_fatfs() {
    let content = pattern(20_000);
    let mut vol = open(fat32_image());
    vol.session(|vol| {
        mark_bad_every(vol, 3)?;
        let root = vol.root()?;
        root.mkfile(vol, "scattered.bin", &FileOptions { content: &content, ..Default::default() })?;
        free_bad(vol)?;
        Ok(())
    })
    .unwrap();

    let report = FragReport::scan(&mut vol).unwrap();
    assert!(report.fragments > 0);

    let mut img = close(vol);
    assert_eq!(read_via_fatfs(&mut img, "scattered.bin"), content);
}

// ── fatfs writes, fatvol reads ───────────────────────────────────────────────

#[test]
fn reads_files_written_by_fatfs() {
    let content = pattern(9000);
    let mut img = fat32_image();
    {
        let mut cursor = Cursor::new(&mut img);
        let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new()).unwrap();
        let docs = fs.root_dir().create_dir("docs").unwrap();
        let mut f = docs.create_file("Read Me First.md").unwrap();
        f.write_all(&content).unwrap();
    }

    let mut vol = open(img);
    let item = vol.lookup("/docs/read me first.md").unwrap();
    assert_eq!(item.name, "Read Me First.md");
    assert_eq!(item.entry.length as usize, content.len());
    assert_eq!(vol.open_file(&item).pread(&mut vol, 0, None).unwrap(), content);

    let docs = vol.open_dir("docs").unwrap();
    let names: Vec<String> = docs.entries(&mut vol).unwrap().into_iter().map(|i| i.name).collect();
    assert!(names.contains(&String::from("Read Me First.md")));
}

#[test]
fn fatvol_and_fatfs_share_a_directory() {
    let mut img = fat16_image();
    {
        let mut cursor = Cursor::new(&mut img);
        let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new()).unwrap();
        let mut f = fs.root_dir().create_file("FIRST.TXT").unwrap();
        f.write_all(b"one").unwrap();
    }

    let mut vol = open(img);
    vol.session(|vol| {
        let root = vol.root()?;
        root.mkfile(vol, "Second File.txt", &FileOptions { content: b"two", ..Default::default() })?;
        Ok(())
    })
    .unwrap();

    let mut img = close(vol);
    assert_eq!(read_via_fatfs(&mut img, "FIRST.TXT"), b"one");
    assert_eq!(read_via_fatfs(&mut img, "Second File.txt"), b"two");
}
