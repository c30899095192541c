//! Prompt text for every LLM-backed step
//!
//! Kept in one place so the agent code reads as control flow. Prompt wording
//! is illustrative, not contractual: graders parse only the structured tool
//! output, never the prose.

/// System prompt for the retrieval-correction agent node.
pub const RAG_AGENT_SYSTEM: &str = "You are a helpful assistant that answers questions based on \
Audit Data and Observation Data. If the user asks anything irrelevant or out of context, don't \
answer and say \"I'm sorry, I can only answer questions based on the audit data and observation \
data.\"
If the user asks about audit data, use the retrieve_audit_data tool.
If the user asks about observation data, use the retrieve_observation_data tool.
NOTE: Answer based on the context, but if the context contains information beyond the question, \
adapt it to answer the question.
NOTE: The answer should be in markdown format.
NOTE: Pay attention to the most recent question from the user and answer it specifically, while \
maintaining context from previous questions if relevant.";

/// Wraps the user's question with answer-style instructions for the RAG agent.
pub fn rag_question(question: &str) -> String {
    format!(
        "question: {question}
NOTE: STRICTLY DON'T mention the context or the source of the information; just give the answer \
plain and simple.
EXAMPLE:
IT SHOULD NOT BE LIKE THIS:
Based on the context, the risk-wise breached observations are: High (152), Medium (131), and Low (34).

IT SHOULD BE LIKE THIS:
The risk-wise breached observations are: High (152), Medium (131), and Low (34)."
    )
}

/// Grading prompt over the whole joined context (retrieval-correction graph).
pub fn grade_context_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a grader assessing relevance of retrieved docs to a user question.
Here are the retrieved docs:
\n ------- \n
{context}
\n ------- \n
Here is the user question: {question}
If the content of the docs is relevant to the user's question, score them as relevant.
Give a binary score 'yes' or 'no' to indicate whether the docs are relevant to the question."
    )
}

/// Per-document grading prompt (self-correcting graph).
pub fn grade_document_prompt(question: &str, document: &str) -> String {
    format!(
        "You are a grader assessing relevance of a retrieved document to a user question.
Here is the retrieved document:

{document}

Here is the user question: {question}

If the document contains keyword(s) or semantic meaning related to the user question, grade it \
as relevant.
Give a binary score 'yes' or 'no' to indicate whether the document is relevant to the question."
    )
}

pub fn grade_generation_v_documents_prompt(documents: &str, generation: &str) -> String {
    format!(
        "You are a grader assessing whether an answer is grounded in / supported by a set of facts.
Here are the facts:
\n ------- \n
{documents}
\n ------- \n
Here is the answer: {generation}
Give a binary score 'yes' or 'no' to indicate whether the answer is grounded in / supported by \
the facts."
    )
}

pub fn grade_generation_v_question_prompt(question: &str, generation: &str) -> String {
    format!(
        "You are a grader assessing whether an answer is useful to resolve a question.
Here is the answer:
\n ------- \n
{generation}
\n ------- \n
Here is the question: {question}
Give a binary score 'yes' or 'no' to indicate whether the answer is useful to resolve the \
question."
    )
}

pub fn rewrite_prompt(question: &str) -> String {
    format!(
        "You are generating a question that is well optimized for semantic search retrieval.
Look at the input and try to reason about the underlying semantic intent / meaning.
Here is the initial question:
\n ------- \n
{question}
\n ------- \n
Formulate an improved question:"
    )
}

/// The answer-generation prompt over accepted context.
pub fn generate_prompt(question: &str, context: &str) -> String {
    format!(
        "You are an assistant for question-answering tasks. Use the following pieces of \
retrieved context to answer the question. If you don't know the answer, just say that you \
don't know. Keep the answer concise.
Question: {question}
Context: {context}
Answer:"
    )
}

/// Single-shot domain gate ahead of the self-correcting graph.
pub const DOMAIN_GATE_SYSTEM: &str = "You are an audit data assistant. You should determine if \
the user's question is related to audit data.
If the question is about audit data, respond with \"RELEVANT\".
If the question is not about audit data, respond with \"NOT RELEVANT\".
Only respond with one of these two options.";

pub const DOMAIN_REFUSAL: &str =
    "I'm sorry, I can only answer questions related to audit data.";

// Supervisor / report generation

pub const DATA_ANALYST_SYSTEM: &str = "You are a helpful AI assistant that specializes in data \
analysis and report generation.";

pub fn supervisor_system(members: &str) -> String {
    format!(
        "You are a supervisor tasked with managing a conversation between the following workers: \
{members}. Given the following user request, respond with the worker to act next. Each worker \
will perform a task and respond with their results and status. When finished, respond with \
FINISH."
    )
}

pub fn supervisor_route_question(options: &str) -> String {
    format!(
        "Given the conversation above, who should act next? Or should we FINISH? Select one of: \
{options}"
    )
}

pub const SUMMARIZER_WORKER_PROMPT: &str = "Always provide the markdown content to the \
generate_pdf_report tool.
Always use the generate_pdf_report tool to generate a PDF document from the markdown content.";

pub fn report_analysis_prompt(content: &str) -> String {
    format!(
        "You are a data analysis expert. Analyze the following data and create a comprehensive \
summary:

{content}

Your analysis should include:
1. Key findings and insights
2. Important patterns or trends
3. Recommendations based on the data
4. Any anomalies or areas of concern

Format your response as detailed markdown that can be converted to a professional PDF report."
    )
}

pub fn supervisor_summary_prompt(report_data: &str, user_request: &str, current_date: &str) -> String {
    format!(
        "You are a professional report analyst specializing in audit progress reports. Your task \
is to create a focused summary based on the provided report and the specific user request.

Here is the full report to analyze:

<report_to_summarize>
{report_data}
</report_to_summarize>

The user has requested a specific focus for this summary:
<user_request>
{user_request}
</user_request>

Structure your summary as:
- Introduction: the purpose of the report and the requested focus.
- Main Body: key findings, conclusions, and recommendations, organized by location if applicable.
- Conclusion: a concise wrap-up of insights and suggested actions.

Maintain a professional and objective tone, use clear language, and mention significant \
statistics where relevant. Aim for about 250-300 words unless the data requires more detail.
CURRENT DATE: {current_date}"
    )
}

// Comparison summaries

pub fn sbu_wise_comparison_prompt(json_data: &str) -> String {
    format!(
        "You are an audit analyst. Compare the strategic business units year over year using the \
data below and produce a concise markdown summary of how each SBU's audit volume and outcomes \
are trending, calling out the strongest and weakest performers.

Data:
{json_data}"
    )
}

pub fn location_wise_comparison_prompt(json_data: &str) -> String {
    format!(
        "You are an audit analyst. Compare audit activity across years using the data below and \
produce a concise markdown summary of the year-over-year trend, highlighting years with unusual \
audit volume.

Data:
{json_data}"
    )
}
