//! SPIR-V operand definitions

#[repr(u32)]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Dim {
    Dim1 = 0,
    Dim2 = 1,
    Dim3 = 2,
    Cube = 3,
    Rect = 4,
    Buffer = 5,
    SubpassData = 6,
}

#[repr(u32)]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum StorageClass {
    UniformConstant = 0,
    Input = 1,
    Uniform = 2,
    Output = 3,
    Workgroup = 4,
    CrossWorkgroup = 5,
    Private = 6,
    Function = 7,
    Generic = 8,
    PushConstant = 9,
    AtomicCounter = 10,
    Image = 11,
    StorageBuffer = 12,
    /// Per-invocation slot shared implicitly by every function of a stage.
    /// Only exists before linking; the linker lowers it to explicit structs.
    Stream = 0x7000,
}

#[repr(u32)]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum ExecutionModel {
    Vertex = 0,
    TessellationControl = 1,
    TessellationEvaluation = 2,
    Geometry = 3,
    Fragment = 4,
    GLCompute = 5,
}

#[repr(u32)]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Builtin {
    Position = 0,
    PointSize = 1,
    ClipDistance = 3,
    CullDistance = 4,
    PrimitiveId = 7,
    InvocationId = 8,
    Layer = 9,
    ViewportIndex = 10,
    TessLevelOuter = 11,
    TessLevelInner = 12,
    TessCoord = 13,
    FragCoord = 15,
    FrontFacing = 17,
    SampleId = 18,
    SampleMask = 20,
    FragDepth = 22,
    WorkgroupId = 26,
    LocalInvocationId = 27,
    GlobalInvocationId = 28,
    LocalInvocationIndex = 29,
    VertexIndex = 42,
    InstanceIndex = 43,
    PrimitiveShadingRateKHR = 4432,
    ViewIndex = 4440,
    ShadingRateKHR = 4444,
    FragStencilRefEXT = 5014,
    FullyCoveredEXT = 5264,
    BaryCoordKHR = 5286,
}

#[repr(u32)]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Decoration {
    Block = 2,
    Flat = 14,
    Patch = 15,
    Builtin = 11,
    Location = 30,
    Binding = 33,
    DescriptorSet = 34,
    Offset = 35,
    UserSemantic = 5635,
    /// Name of the patch constant function of a hull shader entry point.
    PatchConstantFunc = 0x7000,
    /// Numeric id of the resource group a resource belongs to.
    ResourceGroupId = 0x7001,
    ResourceGroup = 0x7002,
    LogicalGroup = 0x7003,
}

bitflags::bitflags! {
    #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
    pub struct FunctionControl : u32 {
        const NONE = 0x00;
        const INLINE = 0x01;
        const DONT_INLINE = 0x02;
        const PURE = 0x04;
        const CONST = 0x08;
    }
}

bitflags::bitflags! {
    #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
    pub struct SelectionControl : u32 {
        const NONE = 0x00;
        const FLATTEN = 0x01;
        const DONT_FLATTEN = 0x02;
    }
}

bitflags::bitflags! {
    #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
    pub struct MemorySemantics : u32 {
        const NONE = 0x00;
        const ACQUIRE = 0x02;
        const RELEASE = 0x04;
        const ACQUIRE_RELEASE = 0x08;
        const UNIFORM_MEMORY = 0x40;
        const WORKGROUP_MEMORY = 0x100;
        const OUTPUT_MEMORY = 0x1000;
    }
}

#[repr(u32)]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Scope {
    CrossDevice = 0,
    Device = 1,
    Workgroup = 2,
    Subgroup = 3,
    Invocation = 4,
}

#[repr(u32)]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum AddressingModel {
    Logical = 0,
}

#[repr(u32)]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum MemoryModel {
    GLSL450 = 1,
}

#[repr(u32)]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum Capability {
    Matrix = 0,
    Shader = 1,
    Geometry = 2,
    Tessellation = 3,
}

#[repr(u32)]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ExecutionMode {
    Invocations = 0,
    SpacingEqual = 1,
    VertexOrderCw = 4,
    VertexOrderCcw = 5,
    OriginUpperLeft = 7,
    LocalSize = 17,
    InputPoints = 19,
    InputLines = 20,
    InputLinesAdjacency = 21,
    Triangles = 22,
    InputTrianglesAdjacency = 23,
    Quads = 24,
    OutputVertices = 26,
    OutputPoints = 27,
    OutputLineStrip = 28,
    OutputTriangleStrip = 29,
}

/// Input primitive topology modifiers allowed on the first geometry shader parameter,
/// plus the usual parameter directions.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum ParameterModifiers {
    #[default]
    None,
    In,
    Out,
    InOut,
    Point,
    Line,
    LineAdjacency,
    Triangle,
    TriangleAdjacency,
}
impl ParameterModifiers {
    /// Execution mode implied by a geometry input topology modifier.
    pub const fn input_topology(self) -> Option<ExecutionMode> {
        match self {
            Self::Point => Some(ExecutionMode::InputPoints),
            Self::Line => Some(ExecutionMode::InputLines),
            Self::LineAdjacency => Some(ExecutionMode::InputLinesAdjacency),
            Self::Triangle => Some(ExecutionMode::Triangles),
            Self::TriangleAdjacency => Some(ExecutionMode::InputTrianglesAdjacency),
            Self::None | Self::In | Self::Out | Self::InOut => None,
        }
    }
}
