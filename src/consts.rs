// Runtime library ABI: classes the generated code links against

pub const OBJECT: &str = "java/lang/Object";
pub const STRING: &str = "java/lang/String";
pub const CLASS: &str = "java/lang/Class";
pub const NUMBER: &str = "java/lang/Number";
pub const THROWABLE: &str = "java/lang/Throwable";
pub const ITERATOR: &str = "java/util/Iterator";
pub const BIG_DECIMAL: &str = "java/math/BigDecimal";
pub const BIG_INTEGER: &str = "java/math/BigInteger";
pub const SOFT_REFERENCE: &str = "java/lang/ref/SoftReference";

pub const GROOVY_OBJECT: &str = "groovy/lang/GroovyObject";
pub const GROOVY_OBJECT_DESC: &str = "Lgroovy/lang/GroovyObject;";
pub const META_CLASS: &str = "groovy/lang/MetaClass";
pub const META_CLASS_DESC: &str = "Lgroovy/lang/MetaClass;";
pub const GROOVY_INTERCEPTABLE: &str = "groovy/lang/GroovyInterceptable";
pub const REFERENCE: &str = "groovy/lang/Reference";
pub const CALL_SITE: &str = "org/codehaus/groovy/runtime/callsite/CallSite";
pub const CALL_SITE_ARRAY: &str = "org/codehaus/groovy/runtime/callsite/CallSiteArray";
pub const SCRIPT_BYTECODE_ADAPTER: &str = "org/codehaus/groovy/runtime/ScriptBytecodeAdapter";
pub const BYTECODE_INTERFACE8: &str = "org/codehaus/groovy/runtime/BytecodeInterface8";
pub const TYPE_TRANSFORMATION: &str = "org/codehaus/groovy/runtime/typehandling/DefaultTypeTransformation";
pub const SHORT_TYPE_HANDLING: &str = "org/codehaus/groovy/runtime/typehandling/ShortTypeHandling";
pub const ARRAY_UTIL: &str = "org/codehaus/groovy/runtime/ArrayUtil";

// Synthetic members of every generated class

pub const CALL_SITE_ARRAY_FIELD: &str = "$callSiteArray";
pub const GET_CALL_SITE_ARRAY: &str = "$getCallSiteArray";
pub const CREATE_CALL_SITE_ARRAY: &str = "$createCallSiteArray";
pub const CREATE_CALL_SITE_ARRAY_CHUNK: &str = "$createCallSiteArray_";
pub const STATIC_META_CLASS_FLAG: &str = "__$stMC";
pub const META_CLASS_FIELD: &str = "metaClass";
pub const GET_STATIC_META_CLASS: &str = "$getStaticMetaClass";

pub const GET_CALL_SITE_ARRAY_DESC: &str = "()[Lorg/codehaus/groovy/runtime/callsite/CallSite;";
pub const CREATE_CALL_SITE_ARRAY_DESC: &str = "()Lorg/codehaus/groovy/runtime/callsite/CallSiteArray;";
pub const CREATE_CALL_SITE_ARRAY_CHUNK_DESC: &str = "([Ljava/lang/String;)V";
pub const CALL_SITE_ARRAY_CTOR_DESC: &str = "(Ljava/lang/Class;[Ljava/lang/String;)V";
pub const SOFT_REFERENCE_DESC: &str = "Ljava/lang/ref/SoftReference;";

// Call-site message names with a fixed meaning

/// Message name of constructor call sites
pub const CONSTRUCTOR_MESSAGE: &str = "<$constructor$>";
pub const CLOSURE_CALL_MESSAGE: &str = "call";
pub const NEXT_MESSAGE: &str = "next";
pub const PREVIOUS_MESSAGE: &str = "previous";
pub const ITERATOR_MESSAGE: &str = "iterator";

/// Argument count above which call-site arguments are packed into an Object[]
pub const MAX_INLINE_CALL_ARGS: usize = 4;

// Safety caps for the verification tooling

// Worklist iterations of the stack-depth analysis
pub const VERIFY_MAX_WORKLIST_STEPS: usize = 1_000_000;
// Instructions executed by the evaluator before it gives up
pub const EVAL_MAX_STEPS: usize = 1_000_000;
