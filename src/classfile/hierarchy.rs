//! Superclass index used to merge reference types in stack-map frames.
//!
//! Where two control-flow paths carry different reference types, the frame at the join must
//! name their closest common superclass, or the verifier rejects the class. The codec has no
//! class loader, so the superclass chain of every class that can meet in a merge has to be
//! known up front: [`ClassHierarchy::jdk`] covers the core platform classes, and
//! [`ClassHierarchy::add_classpath_entry`] indexes user classes from directories and jars.
//!
//! # Examples
//!
//! ```rust
//! use shadowclass::classfile::hierarchy::ClassHierarchy;
//!
//! let jdk = ClassHierarchy::jdk();
//! assert_eq!(
//!     jdk.common_super_class("java/io/IOException", "java/lang/RuntimeException"),
//!     Some("java/lang/Exception".to_string())
//! );
//! assert_eq!(jdk.common_super_class("demo/A", "demo/B"), None);
//! ```

use std::{
    collections::{HashMap, HashSet},
    fs,
    io::{Read, Seek},
    path::Path,
    sync::{Arc, OnceLock},
};

use walkdir::WalkDir;

use crate::{
    classfile::{access::AccessFlags, reader::ClassReader},
    Error, Result,
};

const OBJECT: &str = "java/lang/Object";

/// What the frame merge needs to know about one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassEntry {
    /// Internal name of the superclass, `None` only for `java/lang/Object`
    pub super_name: Option<String>,
    /// Whether the class is an interface
    pub interface: bool,
}

/// Platform classes: `(name, superclass)`.
const JDK_CLASSES: &[(&str, &str)] = &[
    ("java/lang/Throwable", OBJECT),
    ("java/lang/Exception", "java/lang/Throwable"),
    ("java/lang/Error", "java/lang/Throwable"),
    ("java/lang/RuntimeException", "java/lang/Exception"),
    ("java/lang/ArithmeticException", "java/lang/RuntimeException"),
    ("java/lang/ArrayStoreException", "java/lang/RuntimeException"),
    ("java/lang/ClassCastException", "java/lang/RuntimeException"),
    ("java/lang/IllegalArgumentException", "java/lang/RuntimeException"),
    ("java/lang/NumberFormatException", "java/lang/IllegalArgumentException"),
    ("java/lang/IllegalStateException", "java/lang/RuntimeException"),
    ("java/lang/IllegalMonitorStateException", "java/lang/RuntimeException"),
    ("java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException"),
    ("java/lang/ArrayIndexOutOfBoundsException", "java/lang/IndexOutOfBoundsException"),
    ("java/lang/StringIndexOutOfBoundsException", "java/lang/IndexOutOfBoundsException"),
    ("java/lang/NegativeArraySizeException", "java/lang/RuntimeException"),
    ("java/lang/NullPointerException", "java/lang/RuntimeException"),
    ("java/lang/SecurityException", "java/lang/RuntimeException"),
    ("java/lang/UnsupportedOperationException", "java/lang/RuntimeException"),
    ("java/lang/CloneNotSupportedException", "java/lang/Exception"),
    ("java/lang/InterruptedException", "java/lang/Exception"),
    ("java/lang/ReflectiveOperationException", "java/lang/Exception"),
    ("java/lang/ClassNotFoundException", "java/lang/ReflectiveOperationException"),
    ("java/lang/IllegalAccessException", "java/lang/ReflectiveOperationException"),
    ("java/lang/InstantiationException", "java/lang/ReflectiveOperationException"),
    ("java/lang/NoSuchFieldException", "java/lang/ReflectiveOperationException"),
    ("java/lang/NoSuchMethodException", "java/lang/ReflectiveOperationException"),
    (
        "java/lang/reflect/InvocationTargetException",
        "java/lang/ReflectiveOperationException",
    ),
    ("java/lang/LinkageError", "java/lang/Error"),
    ("java/lang/ClassFormatError", "java/lang/LinkageError"),
    ("java/lang/ExceptionInInitializerError", "java/lang/LinkageError"),
    ("java/lang/NoClassDefFoundError", "java/lang/LinkageError"),
    ("java/lang/UnsatisfiedLinkError", "java/lang/LinkageError"),
    ("java/lang/VerifyError", "java/lang/LinkageError"),
    ("java/lang/IncompatibleClassChangeError", "java/lang/LinkageError"),
    ("java/lang/AbstractMethodError", "java/lang/IncompatibleClassChangeError"),
    ("java/lang/NoSuchFieldError", "java/lang/IncompatibleClassChangeError"),
    ("java/lang/NoSuchMethodError", "java/lang/IncompatibleClassChangeError"),
    ("java/lang/AssertionError", "java/lang/Error"),
    ("java/lang/ThreadDeath", "java/lang/Error"),
    ("java/lang/VirtualMachineError", "java/lang/Error"),
    ("java/lang/InternalError", "java/lang/VirtualMachineError"),
    ("java/lang/OutOfMemoryError", "java/lang/VirtualMachineError"),
    ("java/lang/StackOverflowError", "java/lang/VirtualMachineError"),
    ("java/util/ConcurrentModificationException", "java/lang/RuntimeException"),
    ("java/util/EmptyStackException", "java/lang/RuntimeException"),
    ("java/util/MissingResourceException", "java/lang/RuntimeException"),
    ("java/util/NoSuchElementException", "java/lang/RuntimeException"),
    ("java/util/InputMismatchException", "java/util/NoSuchElementException"),
    ("java/util/concurrent/BrokenBarrierException", "java/lang/Exception"),
    ("java/util/concurrent/CancellationException", "java/lang/IllegalStateException"),
    ("java/util/concurrent/CompletionException", "java/lang/RuntimeException"),
    ("java/util/concurrent/ExecutionException", "java/lang/Exception"),
    ("java/util/concurrent/RejectedExecutionException", "java/lang/RuntimeException"),
    ("java/util/concurrent/TimeoutException", "java/lang/Exception"),
    ("java/io/IOException", "java/lang/Exception"),
    ("java/io/EOFException", "java/io/IOException"),
    ("java/io/FileNotFoundException", "java/io/IOException"),
    ("java/io/InterruptedIOException", "java/io/IOException"),
    ("java/io/UnsupportedEncodingException", "java/io/IOException"),
    ("java/io/UTFDataFormatException", "java/io/IOException"),
    ("java/io/ObjectStreamException", "java/io/IOException"),
    ("java/io/InvalidClassException", "java/io/ObjectStreamException"),
    ("java/io/InvalidObjectException", "java/io/ObjectStreamException"),
    ("java/io/NotSerializableException", "java/io/ObjectStreamException"),
    ("java/io/UncheckedIOException", "java/lang/RuntimeException"),
    ("java/net/MalformedURLException", "java/io/IOException"),
    ("java/net/SocketException", "java/io/IOException"),
    ("java/net/ConnectException", "java/net/SocketException"),
    ("java/net/SocketTimeoutException", "java/io/InterruptedIOException"),
    ("java/net/UnknownHostException", "java/io/IOException"),
    ("java/net/URISyntaxException", "java/lang/Exception"),
    ("java/nio/charset/CharacterCodingException", "java/io/IOException"),
    ("java/nio/file/FileSystemException", "java/io/IOException"),
    ("java/nio/file/NoSuchFileException", "java/nio/file/FileSystemException"),
    ("java/security/GeneralSecurityException", "java/lang/Exception"),
    ("java/security/NoSuchAlgorithmException", "java/security/GeneralSecurityException"),
    ("java/sql/SQLException", "java/lang/Exception"),
    ("java/text/ParseException", "java/lang/Exception"),
    ("java/time/DateTimeException", "java/lang/RuntimeException"),
    ("java/time/format/DateTimeParseException", "java/time/DateTimeException"),
    ("java/lang/String", OBJECT),
    ("java/lang/Class", OBJECT),
    ("java/lang/Enum", OBJECT),
    ("java/lang/Record", OBJECT),
    ("java/lang/Thread", OBJECT),
    ("java/lang/Boolean", OBJECT),
    ("java/lang/Character", OBJECT),
    ("java/lang/Number", OBJECT),
    ("java/lang/Byte", "java/lang/Number"),
    ("java/lang/Short", "java/lang/Number"),
    ("java/lang/Integer", "java/lang/Number"),
    ("java/lang/Long", "java/lang/Number"),
    ("java/lang/Float", "java/lang/Number"),
    ("java/lang/Double", "java/lang/Number"),
    ("java/math/BigInteger", "java/lang/Number"),
    ("java/math/BigDecimal", "java/lang/Number"),
    ("java/util/concurrent/atomic/AtomicInteger", "java/lang/Number"),
    ("java/util/concurrent/atomic/AtomicLong", "java/lang/Number"),
    ("java/lang/AbstractStringBuilder", OBJECT),
    ("java/lang/StringBuilder", "java/lang/AbstractStringBuilder"),
    ("java/lang/StringBuffer", "java/lang/AbstractStringBuilder"),
    ("java/util/AbstractCollection", OBJECT),
    ("java/util/AbstractList", "java/util/AbstractCollection"),
    ("java/util/AbstractSequentialList", "java/util/AbstractList"),
    ("java/util/ArrayList", "java/util/AbstractList"),
    ("java/util/LinkedList", "java/util/AbstractSequentialList"),
    ("java/util/Vector", "java/util/AbstractList"),
    ("java/util/Stack", "java/util/Vector"),
    ("java/util/AbstractSet", "java/util/AbstractCollection"),
    ("java/util/HashSet", "java/util/AbstractSet"),
    ("java/util/LinkedHashSet", "java/util/HashSet"),
    ("java/util/TreeSet", "java/util/AbstractSet"),
    ("java/util/EnumSet", "java/util/AbstractSet"),
    ("java/util/AbstractQueue", "java/util/AbstractCollection"),
    ("java/util/PriorityQueue", "java/util/AbstractQueue"),
    ("java/util/ArrayDeque", "java/util/AbstractCollection"),
    ("java/util/AbstractMap", OBJECT),
    ("java/util/HashMap", "java/util/AbstractMap"),
    ("java/util/LinkedHashMap", "java/util/HashMap"),
    ("java/util/TreeMap", "java/util/AbstractMap"),
    ("java/util/IdentityHashMap", "java/util/AbstractMap"),
    ("java/util/WeakHashMap", "java/util/AbstractMap"),
    ("java/util/EnumMap", "java/util/AbstractMap"),
    ("java/util/concurrent/ConcurrentHashMap", "java/util/AbstractMap"),
    ("java/util/Dictionary", OBJECT),
    ("java/util/Hashtable", "java/util/Dictionary"),
    ("java/util/Properties", "java/util/Hashtable"),
    ("java/io/InputStream", OBJECT),
    ("java/io/OutputStream", OBJECT),
    ("java/io/FilterInputStream", "java/io/InputStream"),
    ("java/io/FilterOutputStream", "java/io/OutputStream"),
    ("java/io/BufferedInputStream", "java/io/FilterInputStream"),
    ("java/io/BufferedOutputStream", "java/io/FilterOutputStream"),
    ("java/io/DataInputStream", "java/io/FilterInputStream"),
    ("java/io/DataOutputStream", "java/io/FilterOutputStream"),
    ("java/io/PrintStream", "java/io/FilterOutputStream"),
    ("java/io/FileInputStream", "java/io/InputStream"),
    ("java/io/FileOutputStream", "java/io/OutputStream"),
    ("java/io/ByteArrayInputStream", "java/io/InputStream"),
    ("java/io/ByteArrayOutputStream", "java/io/OutputStream"),
    ("java/io/ObjectInputStream", "java/io/InputStream"),
    ("java/io/ObjectOutputStream", "java/io/OutputStream"),
    ("java/io/Reader", OBJECT),
    ("java/io/Writer", OBJECT),
    ("java/io/BufferedReader", "java/io/Reader"),
    ("java/io/InputStreamReader", "java/io/Reader"),
    ("java/io/FileReader", "java/io/InputStreamReader"),
    ("java/io/StringReader", "java/io/Reader"),
    ("java/io/BufferedWriter", "java/io/Writer"),
    ("java/io/OutputStreamWriter", "java/io/Writer"),
    ("java/io/FileWriter", "java/io/OutputStreamWriter"),
    ("java/io/PrintWriter", "java/io/Writer"),
    ("java/io/StringWriter", "java/io/Writer"),
];

/// Platform interfaces. Any merge involving one of them yields `java/lang/Object`.
const JDK_INTERFACES: &[&str] = &[
    "java/io/Closeable",
    "java/io/Flushable",
    "java/io/Serializable",
    "java/lang/Appendable",
    "java/lang/AutoCloseable",
    "java/lang/CharSequence",
    "java/lang/Cloneable",
    "java/lang/Comparable",
    "java/lang/Iterable",
    "java/lang/Readable",
    "java/lang/Runnable",
    "java/lang/annotation/Annotation",
    "java/lang/reflect/AnnotatedElement",
    "java/lang/reflect/Type",
    "java/util/Collection",
    "java/util/Comparator",
    "java/util/Deque",
    "java/util/Enumeration",
    "java/util/Iterator",
    "java/util/List",
    "java/util/ListIterator",
    "java/util/Map",
    "java/util/NavigableMap",
    "java/util/NavigableSet",
    "java/util/Queue",
    "java/util/RandomAccess",
    "java/util/Set",
    "java/util/SortedMap",
    "java/util/SortedSet",
    "java/util/concurrent/Callable",
    "java/util/concurrent/ConcurrentMap",
    "java/util/concurrent/Executor",
    "java/util/concurrent/ExecutorService",
    "java/util/concurrent/Future",
    "java/util/function/BiFunction",
    "java/util/function/Consumer",
    "java/util/function/Function",
    "java/util/function/Predicate",
    "java/util/function/Supplier",
    "java/util/stream/Stream",
];

/// Superclass index over a set of classes.
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    classes: HashMap<String, ClassEntry>,
}

impl ClassHierarchy {
    /// An empty hierarchy. Only `java/lang/Object` merges resolve against it.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A hierarchy seeded with the core platform classes, ready for user classes.
    #[must_use]
    pub fn with_jdk() -> Self {
        let mut hierarchy = Self::new();
        hierarchy.insert(
            OBJECT,
            ClassEntry {
                super_name: None,
                interface: false,
            },
        );
        for (name, super_name) in JDK_CLASSES {
            hierarchy.insert(
                *name,
                ClassEntry {
                    super_name: Some((*super_name).to_string()),
                    interface: false,
                },
            );
        }
        for name in JDK_INTERFACES {
            hierarchy.insert(
                *name,
                ClassEntry {
                    super_name: Some(OBJECT.to_string()),
                    interface: true,
                },
            );
        }
        hierarchy
    }

    /// The shared platform-only hierarchy used when no classpath was configured.
    #[must_use]
    pub fn jdk() -> Arc<ClassHierarchy> {
        static JDK: OnceLock<Arc<ClassHierarchy>> = OnceLock::new();
        Arc::clone(JDK.get_or_init(|| Arc::new(ClassHierarchy::with_jdk())))
    }

    /// Record `name`. A later insert of the same name replaces the earlier one.
    pub fn insert(&mut self, name: impl Into<String>, entry: ClassEntry) {
        self.classes.insert(name.into(), entry);
    }

    /// Index the class in `bytes` and return its internal name.
    ///
    /// # Errors
    /// Returns the parse error if `bytes` is not a readable class file.
    pub fn add_class(&mut self, bytes: &[u8]) -> Result<String> {
        let (name, entry) = read_entry(bytes)?;
        self.insert(name.clone(), entry);
        Ok(name)
    }

    /// Index every class under a directory or inside a jar, returning how many were added.
    ///
    /// # Errors
    /// Returns [`Error::Path`] naming the entry that could not be read. Class files that do
    /// not parse are skipped with a warning.
    pub fn add_classpath_entry(&mut self, path: &Path) -> Result<usize> {
        if path.is_dir() {
            self.add_directory(path)
        } else {
            let file = fs::File::open(path).map_err(|error| Error::from(error).at_path(path))?;
            self.add_jar(file).map_err(|error| error.at_path(path))
        }
    }

    fn add_directory(&mut self, root: &Path) -> Result<usize> {
        let mut added = 0;
        for entry in WalkDir::new(root) {
            let entry = entry.map_err(|error| walk_error(root, error))?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|extension| extension.to_str()) != Some("class")
            {
                continue;
            }

            let bytes = fs::read(path).map_err(|error| Error::from(error).at_path(path))?;
            match self.add_class(&bytes) {
                Ok(_) => added += 1,
                Err(error) => log::warn!("Skipping {} on the classpath: {}", path.display(), error),
            }
        }
        Ok(added)
    }

    /// Index every `.class` entry of the jar read from `source`.
    ///
    /// # Errors
    /// Returns [`Error::Archive`] if `source` is not a readable zip archive.
    pub fn add_jar<R: Read + Seek>(&mut self, source: R) -> Result<usize> {
        let mut archive = zip::ZipArchive::new(source)?;
        let mut added = 0;
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() || !entry.name().ends_with(".class") {
                continue;
            }

            let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
            entry.read_to_end(&mut bytes)?;
            match self.add_class(&bytes) {
                Ok(_) => added += 1,
                Err(error) => log::warn!("Skipping {} on the classpath: {}", entry.name(), error),
            }
        }
        Ok(added)
    }

    /// The entry recorded for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ClassEntry> {
        self.classes.get(name)
    }

    /// Number of indexed classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// The closest common superclass of two internal class names.
    ///
    /// Interfaces merge to `java/lang/Object`, as the verifier treats them. `None` means a
    /// superclass chain could not be followed to `java/lang/Object`.
    #[must_use]
    pub fn common_super_class(&self, left: &str, right: &str) -> Option<String> {
        common_super_class(|name| self.get(name), left, right)
    }
}

/// Read the hierarchy entry of one class file.
pub(crate) fn read_entry(bytes: &[u8]) -> Result<(String, ClassEntry)> {
    let reader = ClassReader::new(bytes)?;
    let entry = ClassEntry {
        super_name: reader.super_name()?.map(str::to_string),
        interface: reader.access().contains(AccessFlags::INTERFACE),
    };
    Ok((reader.class_name()?.to_string(), entry))
}

pub(crate) fn walk_error(root: &Path, error: walkdir::Error) -> Error {
    let path = error.path().unwrap_or(root).to_path_buf();
    Error::FileError(error.into()).at_path(path)
}

fn common_super_class<'h>(
    lookup: impl Fn(&str) -> Option<&'h ClassEntry>,
    left: &str,
    right: &str,
) -> Option<String> {
    if left == right {
        return Some(left.to_string());
    }
    if left == OBJECT || right == OBJECT {
        return Some(OBJECT.to_string());
    }
    let (left_entry, right_entry) = (lookup(left)?, lookup(right)?);
    if left_entry.interface || right_entry.interface {
        return Some(OBJECT.to_string());
    }

    let ancestors = superclasses(&lookup, left)?;
    let mut current = right.to_string();
    let mut visited = HashSet::new();
    while !ancestors.contains(&current) {
        let super_name = lookup(&current)?.super_name.clone()?;
        if !visited.insert(current) {
            return None;
        }
        current = super_name;
    }
    Some(current)
}

/// `name` and all of its superclasses up to `java/lang/Object`.
fn superclasses<'h>(
    lookup: &impl Fn(&str) -> Option<&'h ClassEntry>,
    name: &str,
) -> Option<HashSet<String>> {
    let mut chain = HashSet::new();
    let mut current = name.to_string();
    loop {
        if current == OBJECT {
            chain.insert(current);
            return Some(chain);
        }
        let super_name = lookup(&current)?.super_name.clone()?;
        if !chain.insert(current) {
            return None;
        }
        current = super_name;
    }
}

/// The hierarchy as seen from one class being written, which may not be indexed yet.
pub(crate) struct Resolver {
    hierarchy: Arc<ClassHierarchy>,
    own: Option<(String, ClassEntry)>,
}

impl Resolver {
    pub fn new(hierarchy: Arc<ClassHierarchy>, own: Option<(String, ClassEntry)>) -> Self {
        Resolver { hierarchy, own }
    }

    fn lookup(&self, name: &str) -> Option<&ClassEntry> {
        match &self.own {
            Some((own, entry)) if own == name => Some(entry),
            _ => self.hierarchy.get(name),
        }
    }

    pub fn common_super_class(&self, left: &str, right: &str) -> Option<String> {
        common_super_class(|name| self.lookup(name), left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::{ClassVisitor, ClassWriter},
        test::class_header,
    };

    fn class(super_name: &str) -> ClassEntry {
        ClassEntry {
            super_name: Some(super_name.to_string()),
            interface: false,
        }
    }

    #[test]
    fn platform_exceptions_meet_at_exception() {
        let jdk = ClassHierarchy::jdk();
        assert_eq!(
            jdk.common_super_class("java/io/IOException", "java/lang/RuntimeException")
                .as_deref(),
            Some("java/lang/Exception")
        );
        assert_eq!(
            jdk.common_super_class("java/io/FileNotFoundException", "java/io/EOFException")
                .as_deref(),
            Some("java/io/IOException")
        );
        assert_eq!(
            jdk.common_super_class("java/lang/Error", "java/lang/String")
                .as_deref(),
            Some(OBJECT)
        );
    }

    #[test]
    fn subclass_meets_its_ancestor() {
        let jdk = ClassHierarchy::jdk();
        assert_eq!(
            jdk.common_super_class("java/util/LinkedHashMap", "java/util/AbstractMap")
                .as_deref(),
            Some("java/util/AbstractMap")
        );
    }

    #[test]
    fn interfaces_merge_to_object() {
        let jdk = ClassHierarchy::jdk();
        assert_eq!(
            jdk.common_super_class("java/util/List", "java/util/ArrayList")
                .as_deref(),
            Some(OBJECT)
        );
    }

    #[test]
    fn unknown_classes_do_not_resolve() {
        let jdk = ClassHierarchy::jdk();
        assert_eq!(jdk.common_super_class("demo/A", "demo/B"), None);
        assert_eq!(jdk.common_super_class("demo/A", "java/lang/Exception"), None);
        // Object and identity need no lookup.
        assert_eq!(jdk.common_super_class("demo/A", OBJECT).as_deref(), Some(OBJECT));
        assert_eq!(jdk.common_super_class("demo/A", "demo/A").as_deref(), Some("demo/A"));
    }

    #[test]
    fn superclass_cycles_do_not_resolve() {
        let mut hierarchy = ClassHierarchy::with_jdk();
        hierarchy.insert("demo/A", class("demo/B"));
        hierarchy.insert("demo/B", class("demo/A"));
        hierarchy.insert("demo/C", class(OBJECT));
        assert_eq!(hierarchy.common_super_class("demo/A", "demo/C"), None);
        assert_eq!(hierarchy.common_super_class("demo/C", "demo/A"), None);
    }

    #[test]
    fn user_classes_are_indexed_from_bytes() -> Result<()> {
        let mut writer = ClassWriter::new();
        let mut header = class_header("demo/Failure");
        header.super_name = Some("java/lang/IllegalStateException".to_string());
        writer.visit(&header)?;
        writer.visit_end()?;

        let mut hierarchy = ClassHierarchy::with_jdk();
        assert_eq!(hierarchy.add_class(&writer.to_bytes()?)?, "demo/Failure");
        assert_eq!(
            hierarchy
                .common_super_class("demo/Failure", "java/lang/IllegalArgumentException")
                .as_deref(),
            Some("java/lang/RuntimeException")
        );
        Ok(())
    }

    #[test]
    fn resolver_sees_the_class_being_written() {
        let resolver = Resolver::new(
            ClassHierarchy::jdk(),
            Some(("demo/Own".to_string(), class("java/io/IOException"))),
        );
        assert_eq!(
            resolver
                .common_super_class("demo/Own", "java/io/EOFException")
                .as_deref(),
            Some("java/io/IOException")
        );
    }

    #[test]
    fn classpath_directory_is_walked() -> Result<()> {
        let mut writer = ClassWriter::new();
        writer.visit(&class_header("demo/nested/Leaf"))?;
        writer.visit_end()?;

        let dir = tempfile::tempdir()?;
        let package = dir.path().join("demo/nested");
        fs::create_dir_all(&package)?;
        fs::write(package.join("Leaf.class"), writer.to_bytes()?)?;
        fs::write(package.join("Broken.class"), b"not a class")?;
        fs::write(package.join("notes.txt"), b"ignored")?;

        let mut hierarchy = ClassHierarchy::new();
        assert_eq!(hierarchy.add_classpath_entry(dir.path())?, 1);
        assert!(hierarchy.get("demo/nested/Leaf").is_some());
        Ok(())
    }
}
