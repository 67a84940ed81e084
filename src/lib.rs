pub mod cli;
pub mod error;
pub mod prompt;
pub mod utils;

use anyhow::{Result, anyhow};
use lazy_static::lazy_static;
use log::{info, trace, warn};
use lopdf::{
    Bookmark, Document, Object, ObjectId, Stream,
    content::{Content, Operation},
    dictionary,
};
use std::ffi::OsStr;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const DEFAULT_IMAGES_OUTPUT_NAME: &str = "merged_images.pdf";
pub const DEFAULT_PDFS_OUTPUT_NAME: &str = "merged.pdf";

const PDF_VERSION: &str = "1.7";
const DEFAULT_TEXT_FORMAT: u32 = 0;
const BLACK_COLOR_RGB: [f32; 3] = [0f32; 3];
const IMAGE_XOBJECT_NAME: &str = "Im0";

lazy_static! {
    static ref SUPPORTED_IMAGE_EXTENSIONS: Vec<String> =
        ["png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp"]
            .map(|not_owned| not_owned.to_string())
            .into_iter()
            .collect();
    static ref SUPPORTED_PDF_EXTENSIONS: Vec<String> = vec!["pdf".to_string()];
    static ref KEPT_CATALOG_CHILDREN_FOR_INPUT_PDF: Vec<String> =
        ["Type", "Version", "Pages", "PageMode"]
            .map(|not_owned| not_owned.to_string())
            .into_iter()
            .collect();
}

/// Merge every image directly inside `input_dir` (lexicographic order, one page per
/// image) into `output_dir/output_name`, `merged_images.pdf` if no name is given.
/// Returns the path of the written document.
pub fn merge_images_to_pdf(
    input_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    output_name: Option<&str>,
) -> Result<PathBuf> {
    let output_path = output_dir
        .as_ref()
        .join(output_name.unwrap_or(DEFAULT_IMAGES_OUTPUT_NAME));

    let mut main_doc = get_merged_images_doc(input_dir, &output_path)?;
    save_document(&mut main_doc, &output_path)?;

    Ok(output_path)
}

/// Merge every PDF directly inside `input_dir` (lexicographic order) into
/// `output_dir/output_name`, `merged.pdf` if no name is given.
/// Returns the path of the written document.
pub fn merge_pdfs_in_directory(
    input_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    output_name: Option<&str>,
) -> Result<PathBuf> {
    let output_path = output_dir
        .as_ref()
        .join(output_name.unwrap_or(DEFAULT_PDFS_OUTPUT_NAME));

    let mut main_doc = get_merged_pdfs_doc(input_dir, &output_path)?;
    save_document(&mut main_doc, &output_path)?;

    Ok(output_path)
}

/// Build a document with one page per image of `input_dir`. The file at `excluded_path`,
/// if any, is never taken as a source.
pub fn get_merged_images_doc(
    input_dir: impl AsRef<Path>,
    excluded_path: impl AsRef<Path>,
) -> Result<Document> {
    let sources = collect_sources(
        input_dir.as_ref(),
        &SUPPORTED_IMAGE_EXTENSIONS,
        excluded_path.as_ref(),
    )?;

    info!("Initialising main document");
    let mut main_doc = Document::with_version(PDF_VERSION);
    let pages_root_id = initialise_doc_with_null_pages(&mut main_doc)?;

    info!("Start converting {} images", sources.len());
    for image_path in &sources {
        append_image_page(&mut main_doc, pages_root_id, image_path)?;
    }

    attach_outline(&mut main_doc)?;

    Ok(main_doc)
}

/// Build a document concatenating the PDFs of `input_dir`. The file at `excluded_path`,
/// if any, is never taken as a source.
pub fn get_merged_pdfs_doc(
    input_dir: impl AsRef<Path>,
    excluded_path: impl AsRef<Path>,
) -> Result<Document> {
    let sources = collect_sources(
        input_dir.as_ref(),
        &SUPPORTED_PDF_EXTENSIONS,
        excluded_path.as_ref(),
    )?;

    info!("Initialising main document");
    let mut main_doc = Document::with_version(PDF_VERSION);
    let pages_root_id = initialise_doc_with_null_pages(&mut main_doc)?;

    info!("Start merging {} documents", sources.len());
    for pdf_path in &sources {
        merge_pdf_file(&mut main_doc, pages_root_id, pdf_path)?;
    }

    attach_outline(&mut main_doc)?;

    Ok(main_doc)
}

/// Regular files directly inside `directory` with one of `extensions`, sorted by path.
fn collect_sources(
    directory: &Path,
    extensions: &[String],
    excluded_path: &Path,
) -> Result<Vec<PathBuf>> {
    let excluded_path = excluded_path.canonicalize().ok();

    let entries = std::fs::read_dir(directory)
        .map_err(|err| anyhow!("Could not read the directory '{}': {err}", directory.display()))?
        .map(|res| match res {
            Ok(dir_entry) => Ok(dir_entry.path()),
            Err(err) => Err(anyhow!("{err}")),
        })
        .collect::<Result<Vec<_>>>()?;

    let mut sources = Vec::with_capacity(entries.len());
    for path in entries {
        if !path.is_file() {
            trace!("Skip '{}': not a regular file", path.display());
        } else if !has_extension(&path, extensions) {
            trace!("Skip '{}': unsupported extension", path.display());
        } else if excluded_path.is_some() && path.canonicalize().ok() == excluded_path {
            trace!("Skip '{}': it is the output document", path.display());
        } else {
            sources.push(path);
        }
    }

    if sources.is_empty() {
        return Err(anyhow!(
            "No files with extension {} found in the directory '{}'",
            extensions.join("/"),
            directory.display()
        ));
    }

    sources.sort();
    Ok(sources)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|extension| {
            extensions
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(extension))
        })
}

pub(crate) fn initialise_doc_with_null_pages(doc: &mut Document) -> Result<ObjectId> {
    let pages_root_id = doc.add_object(dictionary! {
        "Type" => "Pages",
        "Kids" => Object::Array(vec![]),
        "Count" => Object::Integer(0),
    });

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_root_id),
    });
    doc.trailer.set("Root", catalog_id);

    Ok(pages_root_id)
}

/// Register `kid_id` (a page or a whole page tree) under the pages root, adding
/// `pages_count` to the root's count.
pub(crate) fn append_kid(
    doc: &mut Document,
    pages_root_id: ObjectId,
    kid_id: ObjectId,
    pages_count: i64,
) -> Result<()> {
    let pages_root = doc.get_object_mut(pages_root_id)?.as_dict_mut()?;

    let actual_count = pages_root.get(b"Count")?.as_i64()? + pages_count;
    pages_root.set("Count", Object::Integer(actual_count));
    pages_root
        .get_mut(b"Kids")?
        .as_array_mut()?
        .push(Object::Reference(kid_id));

    Ok(())
}

fn append_image_page(
    main_doc: &mut Document,
    pages_root_id: ObjectId,
    image_path: &Path,
) -> Result<()> {
    trace!("Convert the image '{}' into a page", image_path.display());

    let image = image::open(image_path)
        .map_err(|err| anyhow!("Could not decode the image '{}': {err}", image_path.display()))?
        .to_rgb8();
    let (width, height) = image.dimensions();
    let (width, height) = (i64::from(width), i64::from(height));

    let image_id = main_doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        image.into_raw(),
    ));

    // The image space is the unit square, scale it to cover the whole page.
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![width.into(), 0.into(), 0.into(), height.into(), 0.into(), 0.into()],
            ),
            Operation::new("Do", vec![IMAGE_XOBJECT_NAME.into()]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = main_doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let page_id = main_doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_root_id,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                IMAGE_XOBJECT_NAME => image_id,
            },
        },
        "Contents" => content_id,
    });

    append_kid(main_doc, pages_root_id, page_id, 1)?;
    add_file_bookmark(main_doc, image_path, page_id)?;

    Ok(())
}

fn merge_pdf_file(
    main_doc: &mut Document,
    pages_root_id: ObjectId,
    path_doc_to_merge: &Path,
) -> Result<()> {
    trace!("Merge the document '{}'", path_doc_to_merge.display());

    let mut doc_to_merge = Document::load(path_doc_to_merge)
        .map_err(|err| anyhow!("Could not load the PDF '{}': {err}", path_doc_to_merge.display()))?;

    for (child_name, _child_object) in doc_to_merge.catalog()?.iter() {
        let child_name = String::from_utf8_lossy(child_name);
        if !KEPT_CATALOG_CHILDREN_FOR_INPUT_PDF.contains(&child_name.to_string()) {
            warn!(
                "The catalog entry '{child_name}' of '{}' is not carried over",
                path_doc_to_merge.display()
            );
        }
    }

    doc_to_merge.renumber_objects_with(main_doc.max_id + 1);

    let first_page_id = *doc_to_merge.get_pages().get(&1).ok_or(anyhow!(
        "The document '{}' has 0 pages!",
        path_doc_to_merge.display()
    ))?;
    let imported_max_id = doc_to_merge
        .objects
        .keys()
        .map(|(id, _generation)| *id)
        .max()
        .unwrap_or(main_doc.max_id);

    let mut imported_pages_trees = Vec::new();
    for (object_id, mut object) in doc_to_merge.objects {
        match object.type_name().unwrap_or(b"") {
            b"Catalog" | b"ObjStm" | b"XRef" => {}
            b"Pages" => {
                let pages_dict = object.as_dict_mut()?;
                if !pages_dict.has(b"Parent") {
                    pages_dict.set("Parent", Object::Reference(pages_root_id));
                    imported_pages_trees.push((object_id, pages_dict.get(b"Count")?.as_i64()?));
                }
                main_doc.objects.insert(object_id, object);
            }
            _ => {
                main_doc.objects.insert(object_id, object);
            }
        }
    }
    main_doc.max_id = main_doc.max_id.max(imported_max_id);

    for (pages_tree_id, pages_count) in imported_pages_trees {
        append_kid(main_doc, pages_root_id, pages_tree_id, pages_count)?;
    }

    add_file_bookmark(main_doc, path_doc_to_merge, first_page_id)
}

fn add_file_bookmark(main_doc: &mut Document, source_path: &Path, page_id: ObjectId) -> Result<()> {
    let title = source_path
        .file_name()
        .ok_or(anyhow!(
            "The given path '{}' does not contain a filename",
            source_path.display()
        ))?
        .to_string_lossy()
        .to_string();

    let bookmark = Bookmark::new(title, BLACK_COLOR_RGB, DEFAULT_TEXT_FORMAT, page_id);
    main_doc.add_bookmark(bookmark, None);

    Ok(())
}

fn attach_outline(main_doc: &mut Document) -> Result<()> {
    info!("Build the Outline of the main document and append it to the catalog");
    let outlines_id = main_doc.build_outline().ok_or(anyhow!(
        "The Outlines object for the document obtained is empty"
    ))?;

    let catalog = main_doc.catalog_mut()?;
    catalog.set("Outlines", Object::Reference(outlines_id));
    catalog.set("PageMode", Object::Name(b"UseOutlines".to_vec()));

    Ok(())
}

/// The document is written to a temporary file next to `output_path` and renamed
/// over it, so a failed write never leaves a truncated output behind.
fn save_document(main_doc: &mut Document, output_path: &Path) -> Result<()> {
    main_doc.compress();

    let output_dir = match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut partial = NamedTempFile::new_in(output_dir).map_err(|err| {
        anyhow!("Could not create a temporary file in '{}': {err}", output_dir.display())
    })?;

    // `save_modern` produces documents rejected by qpdf once outlines are attached.
    {
        let mut writer = BufWriter::new(partial.as_file_mut());
        main_doc.save_to(&mut writer)?;
        writer.flush()?;
    }

    if std::fs::exists(output_path)? {
        warn!("Overwriting the existing file '{}'", output_path.display());
    }
    partial
        .persist(output_path)
        .map_err(|err| anyhow!("Could not write '{}': {err}", output_path.display()))?;
    info!("Output document saved as '{}'", output_path.display());

    Ok(())
}
